use crate::auth;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

fn handle_users_provision(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        Some(v) if auth::is_known_role(v) => v.to_string(),
        Some(v) => {
            return err(
                &req.id,
                "bad_params",
                format!("unknown role: {}", v),
                Some(json!({ "knownRoles": ["admin", "staff"] })),
            )
        }
        None => return err(&req.id, "bad_params", "missing role", None),
    };

    // The first user on an empty workspace bootstraps without a token;
    // every later provisioning call is an admin operation.
    let have_users = match auth::users_exist(conn) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if have_users {
        if let Err(e) = auth::require_capability(conn, req.auth.as_deref(), auth::CAP_MANAGE_USERS)
        {
            return e.response(&req.id);
        }
    }

    let user_id = Uuid::new_v4().to_string();
    let token = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, name, role, token_hash, created_at) VALUES(?, ?, ?, ?, ?)",
        (
            &user_id,
            &name,
            &role,
            &auth::token_digest(&token),
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    // The cleartext token appears in this response and nowhere else.
    ok(
        &req.id,
        json!({
            "userId": user_id,
            "name": name,
            "role": role,
            "token": token
        }),
    )
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(e) = auth::require_capability(conn, req.auth.as_deref(), auth::CAP_MANAGE_USERS) {
        return e.response(&req.id);
    }

    let mut stmt = match conn.prepare("SELECT id, name, role, created_at FROM users ORDER BY created_at")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let role: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({ "id": id, "name": name, "role": role, "createdAt": created_at }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.provision" => Some(handle_users_provision(state, req)),
        "users.list" => Some(handle_users_list(state, req)),
        _ => None,
    }
}
