
use serde_json::json;
use test_support::{
    import_file, request, request_ok, select_workspace_with_admin, spawn_sidecar, temp_dir,
};

// Six rows in three batches of two. The negative school count in row four
// violates the districts check constraint, so batch 2 fails as a whole.
const CSV: &str = "LEAID,LEA_NAME,ST,SCH\n\
                   0100001,District One,IL,3\n\
                   0100002,District Two,IL,5\n\
                   0100003,District Three,WI,2\n\
                   0100004,District Four,WI,-3\n\
                   0100005,District Five,MN,1\n\
                   0100006,District Six,MN,8\n";

#[test]
fn a_failed_batch_rolls_back_alone_and_later_batches_still_land() {
    let workspace = temp_dir("athletics-batch-isolation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = select_workspace_with_admin(&mut stdin, &mut reader, &workspace);

    let resp = import_file(
        &mut stdin,
        &mut reader,
        "1",
        &token,
        "districts.csv",
        CSV.as_bytes(),
        Some(2),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true), "{}", resp);
    let result = resp.get("result").expect("result");

    // The run as a whole still reports success; the batch failure is an
    // annotation, not a transport failure.
    assert_eq!(result.get("success").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(result.get("total").and_then(|v| v.as_i64()), Some(6));
    assert_eq!(result.get("inserted").and_then(|v| v.as_i64()), Some(4));

    let errors = result.get("errors").and_then(|v| v.as_array()).expect("errors");
    assert_eq!(errors.len(), 1);
    let message = errors[0].as_str().expect("error string");
    assert!(message.starts_with("batch 2:"), "unexpected error: {}", message);

    // Batches 1 and 3 are present.
    for nces_id in ["0100001", "0100002", "0100005", "0100006"] {
        let got = request_ok(
            &mut stdin,
            &mut reader,
            &format!("get-{}", nces_id),
            "districts.get",
            json!({ "ncesId": nces_id }),
        );
        assert!(got.get("district").is_some());
    }

    // Both rows of the failed batch rolled back, including the valid one.
    for nces_id in ["0100003", "0100004"] {
        let got = request(
            &mut stdin,
            &mut reader,
            &format!("missing-{}", nces_id),
            "districts.get",
            json!({ "ncesId": nces_id }),
        );
        assert_eq!(got.get("ok").and_then(|v| v.as_bool()), Some(false));
    }
}
