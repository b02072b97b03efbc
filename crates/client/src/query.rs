use chtop_core::RawRow;

use crate::error::Result;

/// Result-format hint passed along with every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// Structured rows (`FORMAT JSON`).
    Json,
    /// Plain response text, returned untouched.
    Text,
}

impl ResultFormat {
    /// ClickHouse output format name sent as `default_format`.
    pub fn clickhouse_name(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Text => "TabSeparatedRaw",
        }
    }
}

/// What a query returned.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Rows in server order, together with the exact body they were decoded from.
    Rows { raw: String, rows: Vec<RawRow> },
    Text(String),
}

impl QueryOutput {
    pub fn into_text(self) -> String {
        match self {
            Self::Rows { raw, .. } => raw,
            Self::Text(text) => text,
        }
    }
}

/// Synchronous request/response access to the database.
///
/// Implementations must bound every call with a timeout so a slow server
/// cannot stall the caller indefinitely.
pub trait QueryClient {
    fn query(&self, sql: &str, format: ResultFormat) -> Result<QueryOutput>;
}

impl<T: QueryClient + ?Sized> QueryClient for Box<T> {
    fn query(&self, sql: &str, format: ResultFormat) -> Result<QueryOutput> {
        (**self).query(sql, format)
    }
}

impl<T: QueryClient + ?Sized> QueryClient for &T {
    fn query(&self, sql: &str, format: ResultFormat) -> Result<QueryOutput> {
        (**self).query(sql, format)
    }
}

impl<T: QueryClient + ?Sized> QueryClient for std::sync::Arc<T> {
    fn query(&self, sql: &str, format: ResultFormat) -> Result<QueryOutput> {
        (**self).query(sql, format)
    }
}
