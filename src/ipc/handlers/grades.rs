use crate::calc::{self, CalcError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::Snapshot;
use serde_json::json;

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

fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

fn handle_student_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = match snapshot_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match calc::compute_student_grades(snapshot, &snapshot.config, &student_id) {
        Ok(grades) => match serde_json::to_value(&grades) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", format!("{e}"), None),
        },
        Err(e) => calc_err(req, e),
    }
}

fn handle_class_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = match snapshot_ref(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut students: Vec<_> = snapshot.students.iter().collect();
    students.sort_by(|a, b| {
        (&a.apellido1, &a.apellido2, &a.nombre).cmp(&(&b.apellido1, &b.apellido2, &b.nombre))
    });

    let mut rows = Vec::with_capacity(students.len());
    for student in students {
        match calc::compute_student_grades(snapshot, &snapshot.config, &student.id) {
            Ok(grades) => match serde_json::to_value(&grades) {
                Ok(v) => rows.push(v),
                Err(e) => return err(&req.id, "internal", format!("{e}"), None),
            },
            Err(e) => return calc_err(req, e),
        }
    }

    let periods: Vec<serde_json::Value> = snapshot
        .config
        .periods
        .iter()
        .map(|p| json!({ "key": p.key, "name": p.name }))
        .collect();

    ok(&req.id, json!({ "periods": periods, "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.studentSummary" => Some(handle_student_summary(state, req)),
        "grades.classSummary" => Some(handle_class_summary(state, req)),
        _ => None,
    }
}
