use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chtop_core::testing::json_body;
use chtop_core::RawRow;

use crate::error::{ClientError, Result};
use crate::query::{QueryClient, QueryOutput, ResultFormat};

/// One query seen by a [`RecordingClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub sql: String,
    pub format: ResultFormat,
}

#[derive(Default)]
struct State {
    calls: Vec<RecordedQuery>,
    rows: Vec<RawRow>,
    failures: VecDeque<ClientError>,
    text_response: String,
}

/// In-memory [`QueryClient`] that records every call.
///
/// JSON queries answer with the configured rows, text queries with the
/// configured text. Queued failures are returned first, one per call.
#[derive(Default)]
pub struct RecordingClient {
    state: Mutex<State>,
}

impl RecordingClient {
    pub fn new(rows: Vec<RawRow>) -> Self {
        let client = Self::default();
        client.set_rows(rows);
        client
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_rows(&self, rows: Vec<RawRow>) {
        self.state().rows = rows;
    }

    pub fn set_text_response(&self, text: &str) {
        self.state().text_response = text.to_string();
    }

    pub fn fail_next(&self, err: ClientError) {
        self.state().failures.push_back(err);
    }

    pub fn calls(&self) -> Vec<RecordedQuery> {
        self.state().calls.clone()
    }

    /// Number of recorded queries whose SQL starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.sql.starts_with(prefix))
            .count()
    }
}

impl QueryClient for RecordingClient {
    fn query(&self, sql: &str, format: ResultFormat) -> Result<QueryOutput> {
        let mut state = self.state();
        state.calls.push(RecordedQuery {
            sql: sql.to_string(),
            format,
        });
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        Ok(match format {
            ResultFormat::Json => QueryOutput::Rows {
                raw: json_body(&state.rows),
                rows: state.rows.clone(),
            },
            ResultFormat::Text => QueryOutput::Text(state.text_response.clone()),
        })
    }
}
