use crate::model::{CoreField, DisplayRow, FieldKey, RawRow, PLACEHOLDER};
use serde_json::Value;
use std::collections::BTreeMap;

/// Build the display form of one fetched row.
///
/// Missing columns become [`PLACEHOLDER`]; a malformed annotation yields no
/// extra fields. Never fails and has no side effects.
pub fn extract(row: &RawRow, annotation_column: &str) -> DisplayRow {
    let mut fields = BTreeMap::new();

    for field in CoreField::ALL {
        let value = row.get(field.column());
        let text = match field {
            CoreField::Elapsed => value.and_then(Value::as_f64).map(format_elapsed),
            CoreField::IsInitialQuery => value
                .and_then(value_as_bool)
                .map(|initial| String::from(if initial { "yes" } else { "no" })),
            CoreField::Query => value.map(value_to_string).map(|q| flatten_query(&q)),
            _ => value.map(value_to_string),
        };
        fields.insert(
            FieldKey::Core(field),
            text.unwrap_or_else(|| PLACEHOLDER.to_string()),
        );
    }

    if let Some(annotation) = row.get(annotation_column).and_then(Value::as_str) {
        fields.extend(parse_annotation(annotation_column, annotation));
    }

    let original_query = row
        .get(CoreField::Query.column())
        .map(value_to_string)
        .unwrap_or_default();

    DisplayRow {
        fields,
        original_query,
    }
}

/// Parse `key: value; key: value` pairs into extra fields under `namespace`.
///
/// Pieces are split on the first `:` only; pieces without one are skipped.
/// A repeated key keeps its last value.
pub fn parse_annotation(namespace: &str, text: &str) -> BTreeMap<FieldKey, String> {
    let mut extras = BTreeMap::new();
    for piece in text.split(';').map(str::trim) {
        let Some((key, value)) = piece.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        extras.insert(FieldKey::extra(namespace, key), value.trim().to_string());
    }
    extras
}

/// Replace every line break (`\r\n`, `\n`, `\r`) with a single space.
pub fn flatten_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            other => out.push(other),
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Render seconds as `H:MM:SS.mmm`.
pub fn format_elapsed(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return PLACEHOLDER.to_string();
    }
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{hours}:{minutes:02}:{secs:02}.{ms:03}")
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => PLACEHOLDER.to_string(),
        other => other.to_string(),
    }
}

// ClickHouse emits UInt8 flags as numbers, and 64-bit ints as strings.
fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
