use anyhow::Context;
use chrono::{Local, NaiveDate};
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::calc::{parse_day, CalcError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::Snapshot;
use crate::report::{self, ComposedDocument};

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn snapshot_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a Snapshot, serde_json::Value> {
    state
        .snapshot
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_snapshot", "load a snapshot first", None))
}

fn workspace_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a PathBuf, serde_json::Value> {
    state
        .workspace
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

/// Explicit stamp from the caller; falls back to today only at this boundary
/// so the composers themselves stay clock-free.
fn generated_on(req: &Request) -> NaiveDate {
    req.params
        .get("generatedOn")
        .and_then(|v| v.as_str())
        .and_then(parse_day)
        .unwrap_or_else(|| Local::now().date_naive())
}

fn write_document(dir: &Path, doc: &ComposedDocument) -> anyhow::Result<PathBuf> {
    let path = dir.join(&doc.file_name);
    std::fs::write(&path, &doc.bytes)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn reply_with_document(
    req: &Request,
    dir: &Path,
    result: Result<ComposedDocument, CalcError>,
) -> serde_json::Value {
    match result {
        Ok(doc) => match write_document(dir, &doc) {
            Ok(path) => ok(
                &req.id,
                json!({
                    "fileName": doc.file_name,
                    "pages": doc.pages,
                    "path": path.to_string_lossy(),
                }),
            ),
            Err(e) => err(&req.id, "io_error", format!("{e:#}"), None),
        },
        Err(e) => calc_err(req, e),
    }
}

fn handle_service_report(
    state: &mut AppState,
    req: &Request,
    compose: fn(&Snapshot, &str, NaiveDate) -> Result<ComposedDocument, CalcError>,
) -> serde_json::Value {
    let snapshot = match snapshot_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let dir = match workspace_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let service_id = match required_str(req, "serviceId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = compose(snapshot, &service_id, generated_on(req));
    reply_with_document(req, dir, result)
}

fn handle_student_dossier(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = match snapshot_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let dir = match workspace_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let service_id = match required_str(req, "serviceId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result =
        report::compose_student_dossier(snapshot, &service_id, &student_id, generated_on(req));
    reply_with_document(req, dir, result)
}

/// One dossier per student; a failing student aborts only its own document,
/// never the rest of the batch.
fn handle_dossier_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = match snapshot_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let dir = match workspace_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let service_id = match required_str(req, "serviceId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let stamp = generated_on(req);

    let student_ids: Vec<String> = match req.params.get("studentIds").and_then(|v| v.as_array()) {
        Some(ids) => ids
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        None => {
            // Default scope: everyone taking part in the service.
            let vm = match report::build_view_model(snapshot, &service_id) {
                Ok(vm) => vm,
                Err(e) => return calc_err(req, e),
            };
            vm.participating_students
                .iter()
                .map(|s| s.id.clone())
                .collect()
        }
    };

    let mut documents = Vec::with_capacity(student_ids.len());
    for student_id in &student_ids {
        match report::compose_student_dossier(snapshot, &service_id, student_id, stamp) {
            Ok(doc) => match write_document(dir, &doc) {
                Ok(_) => documents.push(json!({
                    "studentId": student_id,
                    "ok": true,
                    "fileName": doc.file_name,
                    "pages": doc.pages,
                })),
                Err(e) => documents.push(json!({
                    "studentId": student_id,
                    "ok": false,
                    "error": { "code": "io_error", "message": format!("{e:#}") },
                })),
            },
            Err(e) => documents.push(json!({
                "studentId": student_id,
                "ok": false,
                "error": { "code": e.code, "message": e.message },
            })),
        }
    }

    ok(&req.id, json!({ "documents": documents }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.planning" => Some(handle_service_report(state, req, report::compose_planning)),
        "reports.trackingSheet" => {
            Some(handle_service_report(state, req, report::compose_tracking_sheet))
        }
        "reports.evaluation" => {
            Some(handle_service_report(state, req, report::compose_evaluation_report))
        }
        "reports.studentDossier" => Some(handle_student_dossier(state, req)),
        "reports.dossierBatch" => Some(handle_dossier_batch(state, req)),
        _ => None,
    }
}
