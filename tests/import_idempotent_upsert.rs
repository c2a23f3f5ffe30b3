
use serde_json::json;
use test_support::{
    import_file, request_ok, select_workspace_with_admin, spawn_sidecar, temp_dir,
};

const CSV: &str = "LEAID,LEA_NAME,ST\n\
                   0100001,Springfield Unified,IL\n\
                   0100002,Madison County Schools,WI\n";

#[test]
fn reimporting_the_same_file_replaces_rows_in_place() {
    let workspace = temp_dir("athletics-import-idempotent");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = select_workspace_with_admin(&mut stdin, &mut reader, &workspace);

    let first = import_file(
        &mut stdin,
        &mut reader,
        "1",
        &token,
        "districts.csv",
        CSV.as_bytes(),
        None,
    );
    let first = first.get("result").expect("result");
    assert_eq!(first.get("inserted").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(first.get("updated").and_then(|v| v.as_i64()), Some(0));

    let second = import_file(
        &mut stdin,
        &mut reader,
        "2",
        &token,
        "districts.csv",
        CSV.as_bytes(),
        None,
    );
    let second = second.get("result").expect("result");
    assert_eq!(second.get("inserted").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(second.get("updated").and_then(|v| v.as_i64()), Some(2));

    // No duplicates keyed on the same NCES ID.
    let listed = request_ok(&mut stdin, &mut reader, "3", "districts.list", json!({}));
    assert_eq!(listed.get("count").and_then(|v| v.as_i64()), Some(2));

    // Replacement clears fields the new file no longer carries.
    let shrunk = "LEAID,LEA_NAME\n0100001,Springfield Unified\n0100002,Madison County Schools\n";
    let _ = import_file(
        &mut stdin,
        &mut reader,
        "4",
        &token,
        "districts.csv",
        shrunk.as_bytes(),
        None,
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "districts.get",
        json!({ "ncesId": "0100001" }),
    );
    let district = got.get("district").expect("district");
    assert!(district.get("state").map(|v| v.is_null()).unwrap_or(false));
}
