use crate::auth;
use crate::import::{self, DistrictRecord, SourceFormat};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const DEFAULT_BATCH_SIZE: usize = 500;

fn handle_districts_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Hard precondition: no parsing before the capability check.
    let user = match auth::require_capability(
        conn,
        req.auth.as_deref(),
        auth::CAP_IMPORT_DISTRICTS,
    ) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let file_name = match req.params.get("fileName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing fileName", None),
    };
    let content_b64 = match req.params.get("contentBase64").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing contentBase64", None),
    };
    let bytes = match BASE64.decode(content_b64) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("contentBase64 is not valid base64: {}", e),
                None,
            )
        }
    };
    let batch_size = req
        .params
        .get("batchSize")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_BATCH_SIZE)
        .max(1);

    let format = import::detect_format(&file_name);
    let parsed = match format {
        SourceFormat::Csv => import::parse_csv_text(&String::from_utf8_lossy(&bytes)),
        SourceFormat::Excel => import::parse_workbook_bytes(&bytes),
    };

    if parsed.records.is_empty() {
        return err(
            &req.id,
            "invalid_file",
            "no valid district rows found; expected columns for NCES ID, district name and state (e.g. LEAID / LEA_NAME / ST)",
            Some(json!({
                "fileName": file_name,
                "fileType": format.label(),
                "skipped": parsed.skipped
            })),
        );
    }

    let total = parsed.records.len();
    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut errors: Vec<String> = Vec::new();

    // Batches are independent writes: a failed batch rolls back alone, is
    // recorded as one error string, and the run moves on to the next batch.
    for (batch_no, batch) in parsed.records.chunks(batch_size).enumerate() {
        match upsert_batch(conn, batch) {
            Ok((ins, upd)) => {
                inserted += ins;
                updated += upd;
            }
            Err(e) => errors.push(format!("batch {}: {}", batch_no + 1, e)),
        }
    }

    // Telemetry only; an import must not fail because its run row did.
    let _ = conn.execute(
        "INSERT INTO import_runs(
           id, user_id, file_name, file_type, total, inserted, updated,
           skipped, error_count, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            user.id,
            file_name,
            format.label(),
            total as i64,
            inserted as i64,
            updated as i64,
            parsed.skipped as i64,
            errors.len() as i64,
            Utc::now().to_rfc3339(),
        ],
    );

    let mut result = json!({
        "success": true,
        "total": total,
        "inserted": inserted,
        "updated": updated,
        "skipped": parsed.skipped,
        "fileType": format.label(),
    });
    if !errors.is_empty() {
        result["errors"] = json!(errors);
    }
    ok(&req.id, result)
}

/// Full-row-replace upsert keyed on nces_id, one transaction per batch. The
/// inserted/updated split comes from a keyed existence probe inside the same
/// transaction; counts only land when the batch commits.
fn upsert_batch(conn: &Connection, batch: &[DistrictRecord]) -> anyhow::Result<(usize, usize)> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0usize;
    let mut updated = 0usize;
    {
        let mut probe = tx.prepare("SELECT 1 FROM districts WHERE nces_id = ?")?;
        let mut upsert = tx.prepare(
            "INSERT INTO districts(
               nces_id, state_lea_id, name, state, state_name, address, city,
               zip, zip4, phone, website, lea_type, lea_type_text, charter_lea,
               operational_status, operational_status_text, lowest_grade,
               highest_grade, operational_schools, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(nces_id) DO UPDATE SET
               state_lea_id = excluded.state_lea_id,
               name = excluded.name,
               state = excluded.state,
               state_name = excluded.state_name,
               address = excluded.address,
               city = excluded.city,
               zip = excluded.zip,
               zip4 = excluded.zip4,
               phone = excluded.phone,
               website = excluded.website,
               lea_type = excluded.lea_type,
               lea_type_text = excluded.lea_type_text,
               charter_lea = excluded.charter_lea,
               operational_status = excluded.operational_status,
               operational_status_text = excluded.operational_status_text,
               lowest_grade = excluded.lowest_grade,
               highest_grade = excluded.highest_grade,
               operational_schools = excluded.operational_schools,
               updated_at = excluded.updated_at",
        )?;

        let now = Utc::now().to_rfc3339();
        for rec in batch {
            let exists = probe.exists([&rec.nces_id])?;
            upsert.execute(rusqlite::params![
                rec.nces_id,
                rec.state_lea_id,
                rec.name,
                rec.state,
                rec.state_name,
                rec.address,
                rec.city,
                rec.zip,
                rec.zip4,
                rec.phone,
                rec.website,
                rec.lea_type,
                rec.lea_type_text,
                rec.charter_lea,
                rec.operational_status,
                rec.operational_status_text,
                rec.lowest_grade,
                rec.highest_grade,
                rec.operational_schools,
                now,
            ])?;
            if exists {
                updated += 1;
            } else {
                inserted += 1;
            }
        }
    }
    tx.commit()?;
    Ok((inserted, updated))
}

fn handle_imports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_i64())
        .unwrap_or(50)
        .clamp(1, 500);

    let mut stmt = match conn.prepare(
        "SELECT id, user_id, file_name, file_type, total, inserted, updated,
                skipped, error_count, created_at
         FROM import_runs ORDER BY created_at DESC LIMIT ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([limit], |row| {
            let id: String = row.get(0)?;
            let user_id: Option<String> = row.get(1)?;
            let file_name: String = row.get(2)?;
            let file_type: String = row.get(3)?;
            let total: i64 = row.get(4)?;
            let inserted: i64 = row.get(5)?;
            let updated: i64 = row.get(6)?;
            let skipped: i64 = row.get(7)?;
            let error_count: i64 = row.get(8)?;
            let created_at: String = row.get(9)?;
            Ok(json!({
                "id": id,
                "userId": user_id,
                "fileName": file_name,
                "fileType": file_type,
                "total": total,
                "inserted": inserted,
                "updated": updated,
                "skipped": skipped,
                "errorCount": error_count,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(runs) => ok(&req.id, json!({ "runs": runs })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "districts.import" => Some(handle_districts_import(state, req)),
        "imports.list" => Some(handle_imports_list(state, req)),
        _ => None,
    }
}
