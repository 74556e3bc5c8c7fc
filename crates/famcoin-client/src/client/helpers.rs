//! Pure helpers: error-body parsing and query building (no HTTP, no status logic).

/// Extract the server's own message from an error body.
///
/// Accepts `{"message": "..."}` and validation bodies of the form
/// `{"message": ["a", "b"]}`. Anything else yields `None`.
pub(crate) fn parse_error_message(body: &str) -> Option<String> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    match json.get("message")? {
        serde_json::Value::String(message) if !message.is_empty() => Some(message.clone()),
        serde_json::Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

/// Query pairs for an optional child scope. Absent child sends nothing.
pub(crate) fn child_query(child_id: Option<&str>) -> Vec<(&'static str, String)> {
    child_id
        .map(|id| vec![("childId", id.to_string())])
        .unwrap_or_default()
}
