use serde_json::json;

/// Success envelope.
pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// Error envelope with an optional structured `details` payload.
pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let error = match details {
        Some(d) => json!({
            "code": code,
            "message": message.into(),
            "details": d,
        }),
        None => json!({
            "code": code,
            "message": message.into(),
        }),
    };
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}
