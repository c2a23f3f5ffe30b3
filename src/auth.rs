use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::ipc::HandlerErr;

pub const CAP_IMPORT_DISTRICTS: &str = "districts.import";
pub const CAP_MANAGE_USERS: &str = "users.manage";
pub const CAP_MANAGE_BACKUPS: &str = "backup.manage";

pub struct AuthedUser {
    pub id: String,
    pub role: String,
}

/// Tokens are stored only as hex SHA-256 digests; the cleartext leaves the
/// process once, in the provisioning response.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn is_known_role(role: &str) -> bool {
    matches!(role, "admin" | "staff")
}

fn role_has_capability(role: &str, capability: &str) -> bool {
    match capability {
        CAP_IMPORT_DISTRICTS | CAP_MANAGE_USERS | CAP_MANAGE_BACKUPS => role == "admin",
        _ => false,
    }
}

pub fn users_exist(conn: &Connection) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get::<_, i64>(0))
        .map(|n| n > 0)
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "users" })),
        })
}

/// Resolve the request token and check it against a capability. Fails before
/// any other work: missing or unknown tokens are unauthenticated, known
/// tokens without the capability are forbidden.
pub fn require_capability(
    conn: &Connection,
    token: Option<&str>,
    capability: &str,
) -> Result<AuthedUser, HandlerErr> {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return Err(HandlerErr {
            code: "unauthenticated",
            message: "missing auth token".into(),
            details: None,
        });
    };

    let digest = token_digest(token);
    let user = conn
        .query_row(
            "SELECT id, role FROM users WHERE token_hash = ?",
            [&digest],
            |r| {
                Ok(AuthedUser {
                    id: r.get(0)?,
                    role: r.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "users" })),
        })?;

    let Some(user) = user else {
        return Err(HandlerErr {
            code: "unauthenticated",
            message: "unknown auth token".into(),
            details: None,
        });
    };

    if !role_has_capability(&user.role, capability) {
        return Err(HandlerErr {
            code: "forbidden",
            message: format!("role {} lacks capability {}", user.role, capability),
            details: None,
        });
    }

    Ok(user)
}
