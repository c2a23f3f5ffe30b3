
use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_covers_handler_families_and_rejects_unknown_methods() {
    let workspace = temp_dir("athletics-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health
        .get("workspacePath")
        .map(|v| v.is_null())
        .unwrap_or(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert!(health
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .is_some());

    let listed = request_ok(&mut stdin, &mut reader, "4", "districts.list", json!({}));
    assert_eq!(listed.get("count").and_then(|v| v.as_i64()), Some(0));

    let runs = request_ok(&mut stdin, &mut reader, "5", "imports.list", json!({}));
    assert_eq!(
        runs.get("runs").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let unknown = request(&mut stdin, &mut reader, "6", "districts.destroyAll", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");
}
