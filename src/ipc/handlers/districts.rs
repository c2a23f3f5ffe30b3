use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_districts_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let state_filter = req
        .params
        .get("state")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty());
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_i64())
        .unwrap_or(100)
        .clamp(1, 1000);
    let offset = req
        .params
        .get("offset")
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
        .max(0);

    let row_to_json = |row: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        let nces_id: String = row.get(0)?;
        let name: Option<String> = row.get(1)?;
        let state: Option<String> = row.get(2)?;
        let city: Option<String> = row.get(3)?;
        let operational_schools: i64 = row.get(4)?;
        Ok(json!({
            "ncesId": nces_id,
            "name": name,
            "state": state,
            "city": city,
            "operationalSchools": operational_schools
        }))
    };

    let rows = if let Some(st) = state_filter {
        conn.prepare(
            "SELECT nces_id, name, state, city, operational_schools
             FROM districts WHERE state = ? ORDER BY nces_id LIMIT ? OFFSET ?",
        )
        .and_then(|mut stmt| {
            stmt.query_map(rusqlite::params![st, limit, offset], |r| row_to_json(r))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        })
    } else {
        conn.prepare(
            "SELECT nces_id, name, state, city, operational_schools
             FROM districts ORDER BY nces_id LIMIT ? OFFSET ?",
        )
        .and_then(|mut stmt| {
            stmt.query_map(rusqlite::params![limit, offset], |r| row_to_json(r))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        })
    };

    match rows {
        Ok(districts) => ok(
            &req.id,
            json!({ "districts": districts, "count": districts.len() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_districts_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let nces_id = match req.params.get("ncesId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing ncesId", None),
    };

    let row = conn
        .query_row(
            "SELECT nces_id, state_lea_id, name, state, state_name, address,
                    city, zip, zip4, phone, website, lea_type, lea_type_text,
                    charter_lea, operational_status, operational_status_text,
                    lowest_grade, highest_grade, operational_schools, updated_at
             FROM districts WHERE nces_id = ?",
            [&nces_id],
            |row| {
                let nces_id: String = row.get(0)?;
                let state_lea_id: Option<String> = row.get(1)?;
                let name: Option<String> = row.get(2)?;
                let state: Option<String> = row.get(3)?;
                let state_name: Option<String> = row.get(4)?;
                let address: Option<String> = row.get(5)?;
                let city: Option<String> = row.get(6)?;
                let zip: Option<String> = row.get(7)?;
                let zip4: Option<String> = row.get(8)?;
                let phone: Option<String> = row.get(9)?;
                let website: Option<String> = row.get(10)?;
                let lea_type: Option<String> = row.get(11)?;
                let lea_type_text: Option<String> = row.get(12)?;
                let charter_lea: Option<String> = row.get(13)?;
                let operational_status: Option<String> = row.get(14)?;
                let operational_status_text: Option<String> = row.get(15)?;
                let lowest_grade: Option<String> = row.get(16)?;
                let highest_grade: Option<String> = row.get(17)?;
                let operational_schools: i64 = row.get(18)?;
                let updated_at: Option<String> = row.get(19)?;
                Ok(json!({
                    "ncesId": nces_id,
                    "stateLeaId": state_lea_id,
                    "name": name,
                    "state": state,
                    "stateName": state_name,
                    "address": address,
                    "city": city,
                    "zip": zip,
                    "zip4": zip4,
                    "phone": phone,
                    "website": website,
                    "leaType": lea_type,
                    "leaTypeText": lea_type_text,
                    "charterLea": charter_lea,
                    "operationalStatus": operational_status,
                    "operationalStatusText": operational_status_text,
                    "lowestGrade": lowest_grade,
                    "highestGrade": highest_grade,
                    "operationalSchools": operational_schools,
                    "updatedAt": updated_at
                }))
            },
        )
        .optional();

    match row {
        Ok(Some(district)) => ok(&req.id, json!({ "district": district })),
        Ok(None) => err(
            &req.id,
            "not_found",
            "district not found",
            Some(json!({ "ncesId": nces_id })),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "districts.list" => Some(handle_districts_list(state, req)),
        "districts.get" => Some(handle_districts_get(state, req)),
        _ => None,
    }
}
