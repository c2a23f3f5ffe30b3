
use serde_json::json;
use test_support::{
    error_code, import_file, request, request_with_auth, select_workspace_with_admin,
    spawn_sidecar, temp_dir,
};

#[test]
fn header_only_file_is_a_validation_error_not_a_crash() {
    let workspace = temp_dir("athletics-empty-input");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = select_workspace_with_admin(&mut stdin, &mut reader, &workspace);

    let resp = import_file(
        &mut stdin,
        &mut reader,
        "1",
        &token,
        "districts.csv",
        b"LEAID,LEA_NAME,ST\n",
        None,
    );
    assert_eq!(error_code(&resp), "invalid_file");
    let message = resp
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .expect("message");
    assert!(message.contains("NCES ID"), "message names key columns: {}", message);
}

#[test]
fn all_rows_missing_the_key_reports_skipped_count() {
    let workspace = temp_dir("athletics-all-keyless");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = select_workspace_with_admin(&mut stdin, &mut reader, &workspace);

    let resp = import_file(
        &mut stdin,
        &mut reader,
        "1",
        &token,
        "districts.csv",
        b"LEAID,LEA_NAME,ST\n,First,TX\n,Second,TX\n",
        None,
    );
    assert_eq!(error_code(&resp), "invalid_file");
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("details"))
            .and_then(|d| d.get("skipped"))
            .and_then(|v| v.as_i64()),
        Some(2)
    );
}

#[test]
fn missing_upload_params_are_rejected() {
    let workspace = temp_dir("athletics-bad-params");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = select_workspace_with_admin(&mut stdin, &mut reader, &workspace);

    let no_file = request_with_auth(
        &mut stdin,
        &mut reader,
        "1",
        "districts.import",
        json!({ "contentBase64": "QQ==" }),
        Some(&token),
    );
    assert_eq!(error_code(&no_file), "bad_params");

    let no_content = request_with_auth(
        &mut stdin,
        &mut reader,
        "2",
        "districts.import",
        json!({ "fileName": "districts.csv" }),
        Some(&token),
    );
    assert_eq!(error_code(&no_content), "bad_params");

    let bad_b64 = request_with_auth(
        &mut stdin,
        &mut reader,
        "3",
        "districts.import",
        json!({ "fileName": "districts.csv", "contentBase64": "!!not-base64!!" }),
        Some(&token),
    );
    assert_eq!(error_code(&bad_b64), "bad_params");
}

#[test]
fn methods_require_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "districts.list", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");
}
