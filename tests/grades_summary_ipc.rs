mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, sample_snapshot, spawn_sidecar};

#[test]
fn student_summary_reports_weighted_service_grade() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "snapshot.load",
        json!({ "snapshot": sample_snapshot() }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.studentSummary",
        json!({ "studentId": "s1" }),
    );

    // 7.5 individual and 6.0 group under 0.6/0.4 weights.
    assert_eq!(
        summary
            .get("serviceAverages")
            .and_then(|v| v.get("t1"))
            .and_then(|v| v.as_f64()),
        Some(6.9)
    );
    // The manual instrument has no grade, so renormalization makes the
    // period average equal the service grade.
    assert_eq!(
        summary
            .get("periodAverages")
            .and_then(|v| v.get("t1"))
            .and_then(|v| v.as_f64()),
        Some(6.9)
    );
    assert!(summary
        .get("practicalExams")
        .and_then(|v| v.get("t1"))
        .map(|v| v.is_null())
        .unwrap_or(false));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn student_without_qualifying_scores_gets_null_not_zero() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "snapshot.load",
        json!({ "snapshot": sample_snapshot() }),
    );
    // s3 has no individual scores and no group score vector.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.studentSummary",
        json!({ "studentId": "s3" }),
    );
    assert!(summary
        .get("serviceAverages")
        .and_then(|v| v.get("t1"))
        .map(|v| v.is_null())
        .unwrap_or(false));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn class_summary_orders_students_by_surname() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "snapshot.load",
        json!({ "snapshot": sample_snapshot() }),
    );
    let summary = request_ok(&mut stdin, &mut reader, "2", "grades.classSummary", json!({}));

    let students = summary
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 3);
    let ids: Vec<&str> = students
        .iter()
        .filter_map(|s| s.get("studentId").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
    assert_eq!(
        summary
            .get("periods")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_student_is_a_not_found_error() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "snapshot.load",
        json!({ "snapshot": sample_snapshot() }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.studentSummary",
        json!({ "studentId": "ghost" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    drop(stdin);
    let _ = child.wait();
}
