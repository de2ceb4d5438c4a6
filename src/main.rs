mod calc;
mod ipc;
mod layout;
mod model;
mod pdf;
mod report;

use std::io::{self, BufRead, Write};

/// Line-oriented JSON sidecar: one request per stdin line, one reply per
/// stdout line. State is a selected workspace plus the loaded snapshot.
fn main() {
    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // No id to echo; reply with a null one so the host can log it.
            Err(e) => serde_json::json!({
                "id": null,
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() },
            }),
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&reply).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
