mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, sample_snapshot, spawn_sidecar, temp_dir};

fn assert_pdf_written(workspace: &std::path::Path, result: &serde_json::Value) {
    let file_name = result
        .get("fileName")
        .and_then(|v| v.as_str())
        .expect("fileName");
    let pages = result.get("pages").and_then(|v| v.as_u64()).expect("pages");
    assert!(pages >= 1);

    let bytes = std::fs::read(workspace.join(file_name)).expect("written document");
    assert!(bytes.starts_with(b"%PDF-"), "{file_name} is not a PDF");
}

#[test]
fn service_reports_write_pdfs_into_the_workspace() {
    let workspace = temp_dir("practicad-reports");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "snapshot.load",
        json!({ "snapshot": sample_snapshot() }),
    );

    let planning = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.planning",
        json!({ "serviceId": "srv1", "generatedOn": "2025-10-20" }),
    );
    assert_eq!(
        planning.get("fileName").and_then(|v| v.as_str()),
        Some("Planning_Servicio_Otoño.pdf")
    );
    assert_pdf_written(&workspace, &planning);

    let tracking = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.trackingSheet",
        json!({ "serviceId": "srv1", "generatedOn": "2025-10-20" }),
    );
    assert_pdf_written(&workspace, &tracking);
    // Two participating groups, one page each.
    assert!(tracking.get("pages").and_then(|v| v.as_u64()).unwrap_or(0) >= 2);

    let evaluation = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.evaluation",
        json!({ "serviceId": "srv1", "generatedOn": "2025-10-20" }),
    );
    assert_pdf_written(&workspace, &evaluation);

    let dossier = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.studentDossier",
        json!({ "serviceId": "srv1", "studentId": "s1", "generatedOn": "2025-10-20" }),
    );
    assert_eq!(
        dossier.get("fileName").and_then(|v| v.as_str()),
        Some("Informe_Abad_Ana.pdf")
    );
    assert_pdf_written(&workspace, &dossier);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tracking_sheet_without_pre_service_days_fails_cleanly() {
    let workspace = temp_dir("practicad-reports-no-preservice");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut snapshot = sample_snapshot();
    snapshot["serviceEvaluations"][0]["preService"] = json!({});

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "snapshot.load",
        json!({ "snapshot": snapshot }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "reports.trackingSheet",
        json!({ "serviceId": "srv1" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn report_for_unknown_service_is_not_found() {
    let workspace = temp_dir("practicad-reports-missing-service");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "snapshot.load",
        json!({ "snapshot": sample_snapshot() }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "reports.evaluation",
        json!({ "serviceId": "nope" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
