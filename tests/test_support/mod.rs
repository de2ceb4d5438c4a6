#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_practicad");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn practicad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

pub fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// One service, two participating groups, three students. Individual sum
/// 7.5 and group sum 6.0 for s1 give the 6.9 weighted service grade under
/// the default 0.6/0.4 weights.
pub fn sample_snapshot() -> serde_json::Value {
    json!({
        "students": [
            { "id": "s1", "nombre": "Ana", "apellido1": "Abad", "apellido2": "Mora", "nre": "100", "grupo": "2CO" },
            { "id": "s2", "nombre": "Lucía", "apellido1": "García", "apellido2": "Pons", "nre": "200", "grupo": "2CO" },
            { "id": "s3", "nombre": "Mario", "apellido1": "Núñez", "apellido2": "Gil", "nre": "300", "grupo": "2CO" }
        ],
        "practiceGroups": [
            { "id": "g1", "name": "Grupo 1", "studentIds": ["s1", "s2"] },
            { "id": "g2", "name": "Grupo 2", "studentIds": ["s3"] }
        ],
        "services": [
            {
                "id": "srv1",
                "name": "Servicio Otoño",
                "date": "2025-10-15",
                "assignedGroups": { "comedor": ["g1"], "takeaway": ["g2"] },
                "elaborations": {
                    "comedor": [ { "id": "e1", "name": "Crema de calabaza", "responsibleGroupId": "g1" } ],
                    "takeaway": [ { "id": "e2", "name": "Bocadillo vegetal", "responsibleGroupId": "g2" } ]
                },
                "studentRoles": [ { "studentId": "s1", "roleId": "r1" } ]
            }
        ],
        "serviceRoles": [ { "id": "r1", "name": "Jefe de cocina", "type": "leader" } ],
        "serviceEvaluations": [
            {
                "id": "ev1",
                "serviceId": "srv1",
                "preService": {
                    "2025-10-13": {
                        "individualEvaluations": {
                            "s1": { "attendance": true, "hasFichas": false, "behaviorScores": { "actitud": 2 }, "observations": "Bien" }
                        }
                    }
                },
                "serviceDay": {
                    "groupScores": { "g1": { "scores": [3.0, null, 3.0], "observations": "Buen ritmo" } },
                    "individualScores": {
                        "s1": { "attendance": true, "scores": [4.0, 3.5, null, null], "observations": "" }
                    }
                }
            }
        ],
        "entryExitRecords": [
            { "id": "i1", "studentId": "s1", "date": "13/10/2025", "type": "Llegada Tarde", "reason": "Bus" },
            { "id": "i2", "studentId": "s1", "date": "20/10/2025", "type": "Llegada Tarde", "reason": "Fuera de semana" }
        ],
        "teacher": { "name": "Profesor Ejemplo" },
        "institute": { "name": "IES Ejemplo", "address": "Calle Mayor 1" },
        "config": {
            "periods": [
                {
                    "key": "t1",
                    "name": "1º Trimestre",
                    "start": "2025-09-08",
                    "end": "2025-12-20",
                    "instruments": [
                        { "key": "servicios", "name": "Servicios", "weight": 0.5, "source": { "type": "serviceAverage" } },
                        { "key": "teoria", "name": "Teoría", "weight": 0.5, "source": { "type": "manual" } }
                    ]
                }
            ]
        }
    })
}
