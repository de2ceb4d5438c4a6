use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{validate_snapshot, Snapshot};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "snapshotLoaded": state.snapshot.is_some(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Documents are written here; make sure it exists up front.
    if let Err(e) = std::fs::create_dir_all(&path) {
        return err(&req.id, "workspace_unavailable", format!("{e}"), None);
    }

    state.workspace = Some(path.clone());
    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_snapshot_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("snapshot") else {
        return err(&req.id, "bad_params", "missing params.snapshot", None);
    };

    let snapshot: Snapshot = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid snapshot: {e}"), None),
    };

    // Non-fatal findings; the snapshot loads either way.
    let issues = validate_snapshot(&snapshot);

    let counts = json!({
        "students": snapshot.students.len(),
        "practiceGroups": snapshot.practice_groups.len(),
        "services": snapshot.services.len(),
        "serviceEvaluations": snapshot.service_evaluations.len(),
        "practicalExamEvaluations": snapshot.practical_exam_evaluations.len(),
        "entryExitRecords": snapshot.entry_exit_records.len(),
    });
    state.snapshot = Some(snapshot);

    ok(
        &req.id,
        json!({
            "loaded": counts,
            "issues": issues,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "snapshot.load" => Some(handle_snapshot_load(state, req)),
        _ => None,
    }
}
