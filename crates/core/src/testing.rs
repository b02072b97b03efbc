use crate::model::RawRow;
use serde_json::{json, Value};

/// A `system.processes` row with the columns the dashboard reads.
pub fn process_row(query_id: &str, query: &str) -> RawRow {
    object(json!({
        "query_id": query_id,
        "user": "default",
        "address": "::ffff:127.0.0.1",
        "elapsed": 1.25,
        "is_initial_query": 1,
        "query": query,
        "http_user_agent": format!("CHProxy-User: user-{query_id}; RemoteAddr: 10.0.0.1:5000"),
    }))
}

/// `FORMAT JSON` response body wrapping `rows`.
pub fn json_body(rows: &[RawRow]) -> String {
    json!({
        "meta": [
            { "name": "query_id", "type": "String" },
            { "name": "query", "type": "String" }
        ],
        "data": rows,
        "rows": rows.len(),
        "statistics": { "elapsed": 0.001, "rows_read": rows.len(), "bytes_read": 0 }
    })
    .to_string()
}

fn object(value: Value) -> RawRow {
    match value {
        Value::Object(map) => map,
        _ => RawRow::new(),
    }
}
