use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One row of `system.processes` exactly as the server returned it.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// Placeholder shown for any field the server did not supply.
pub const PLACEHOLDER: &str = "N/A";

/// Column holding the semicolon-separated `key: value` annotation string.
pub const ANNOTATION_COLUMN: &str = "http_user_agent";

/// Columns read directly from a [`RawRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoreField {
    QueryId,
    User,
    Address,
    Elapsed,
    Query,
    IsInitialQuery,
}

impl CoreField {
    pub const ALL: [CoreField; 6] = [
        CoreField::QueryId,
        CoreField::User,
        CoreField::Address,
        CoreField::Elapsed,
        CoreField::Query,
        CoreField::IsInitialQuery,
    ];

    /// Server-side column name.
    pub fn column(self) -> &'static str {
        match self {
            Self::QueryId => "query_id",
            Self::User => "user",
            Self::Address => "address",
            Self::Elapsed => "elapsed",
            Self::Query => "query",
            Self::IsInitialQuery => "is_initial_query",
        }
    }
}

/// Address of one field in a [`DisplayRow`].
///
/// Core fields come from named columns; extra fields are synthesized from the
/// annotation string and are addressed by the column they were parsed from
/// plus the annotation key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    Core(CoreField),
    Extra { namespace: String, key: String },
}

impl FieldKey {
    pub fn extra(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Extra {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

/// Read-only, render-ready view of one process row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub(crate) fields: BTreeMap<FieldKey, String>,
    pub(crate) original_query: String,
}

impl DisplayRow {
    pub fn get(&self, key: &FieldKey) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Core field value, or [`PLACEHOLDER`] when the column was missing.
    pub fn core(&self, field: CoreField) -> &str {
        self.get(&FieldKey::Core(field)).unwrap_or(PLACEHOLDER)
    }

    pub fn extra(&self, namespace: &str, key: &str) -> Option<&str> {
        self.get(&FieldKey::extra(namespace, key))
    }

    pub fn query_id(&self) -> &str {
        self.core(CoreField::QueryId)
    }

    /// Single-line query text used for the table.
    pub fn flat_query(&self) -> &str {
        self.core(CoreField::Query)
    }

    /// Query text with its line breaks intact, as used for export.
    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    /// Extra fields parsed from the annotation string, in key order.
    pub fn extras(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.fields.iter().filter_map(|(key, value)| match key {
            FieldKey::Extra { namespace, key } => {
                Some((namespace.as_str(), key.as_str(), value.as_str()))
            }
            FieldKey::Core(_) => None,
        })
    }

    /// User name forwarded by CHProxy, if the request went through one.
    pub fn proxy_user(&self) -> &str {
        self.extra(ANNOTATION_COLUMN, "CHProxy-User")
            .filter(|v| !v.is_empty())
            .unwrap_or(PLACEHOLDER)
    }

    /// Client host forwarded by CHProxy, without its port.
    pub fn remote_host(&self) -> &str {
        self.extra(ANNOTATION_COLUMN, "RemoteAddr")
            .map(strip_port)
            .filter(|v| !v.is_empty())
            .unwrap_or(PLACEHOLDER)
    }
}

fn strip_port(addr: &str) -> &str {
    // `[::1]:9000` and `10.0.0.1:9000`; a bare IPv6 literal has several colons.
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match addr.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host
        }
        _ => addr,
    }
}

/// Every row of one successful fetch, plus the response body it came from.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub rows: Vec<DisplayRow>,
    pub raw: String,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(rows: Vec<DisplayRow>, raw: String, fetched_at: DateTime<Utc>) -> Self {
        Self {
            rows,
            raw,
            fetched_at: Some(fetched_at),
        }
    }

    /// True until the first successful fetch.
    pub fn is_initial(&self) -> bool {
        self.fetched_at.is_none()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&DisplayRow> {
        self.rows.get(index)
    }
}
