use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use chtop_client::{ClientError, QueryClient, QueryOutput, ResultFormat};
use chtop_core::{extract, Snapshot, ANNOTATION_COLUMN};
use tracing::{debug, info};

use crate::export;

pub const PROCESSES_QUERY: &str = "SELECT * FROM system.processes";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Query(#[from] ClientError),

    #[error("nothing fetched yet")]
    NoSnapshot,

    #[error("no row {index} (snapshot has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("server answered with text where rows were expected")]
    UnexpectedFormat,

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Connection-scoped state: the latest snapshot and the closed/paused flags.
///
/// The snapshot is replaced wholesale on every successful fetch; callers that
/// hold an `Arc` from [`Session::snapshot`] keep a complete view of the rows
/// they were given.
pub struct Session<C> {
    client: C,
    snapshot: Arc<Snapshot>,
    export_dir: PathBuf,
    paused: bool,
    closed: bool,
}

impl<C: QueryClient> Session<C> {
    pub fn new(client: C, export_dir: PathBuf) -> Self {
        Self {
            client,
            snapshot: Arc::new(Snapshot::default()),
            export_dir,
            paused: false,
            closed: false,
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Fetch the process table and swap in the new snapshot.
    ///
    /// On error the previous snapshot stays in place.
    pub fn fetch(&mut self) -> Result<usize, SessionError> {
        let output = self.client.query(PROCESSES_QUERY, ResultFormat::Json)?;
        let QueryOutput::Rows { raw, rows } = output else {
            return Err(SessionError::UnexpectedFormat);
        };
        let rows: Vec<_> = rows
            .iter()
            .map(|row| extract(row, ANNOTATION_COLUMN))
            .collect();
        let count = rows.len();
        self.snapshot = Arc::new(Snapshot::new(rows, raw, Utc::now()));
        debug!("fetched {count} running queries");
        Ok(count)
    }

    /// Send `KILL QUERY` for `query_id` without waiting for it to stop.
    ///
    /// The server's reply is returned verbatim; it is not interpreted.
    pub fn kill(&self, query_id: &str) -> Result<String, SessionError> {
        let sql = kill_statement(query_id);
        info!("killing query {query_id}");
        let output = self.client.query(&sql, ResultFormat::Text)?;
        Ok(output.into_text().trim().to_string())
    }

    /// Dump the raw body of the last fetch to a new `.json` file.
    pub fn export_full(&self) -> Result<PathBuf, SessionError> {
        if self.snapshot.is_initial() {
            return Err(SessionError::NoSnapshot);
        }
        let path = export::write_unique(
            &self.export_dir,
            "chtop-processes",
            "json",
            &self.snapshot.raw,
        )?;
        info!("exported snapshot to {}", path.display());
        Ok(path)
    }

    /// Dump the original, multi-line query text of row `index` to a `.sql` file.
    pub fn export_one(&self, index: usize) -> Result<PathBuf, SessionError> {
        let row = self
            .snapshot
            .row(index)
            .ok_or(SessionError::IndexOutOfRange {
                index,
                len: self.snapshot.len(),
            })?;
        let path = export::write_unique(
            &self.export_dir,
            "chtop-query",
            "sql",
            row.original_query(),
        )?;
        info!("exported query {} to {}", row.query_id(), path.display());
        Ok(path)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn kill_statement(query_id: &str) -> String {
    let escaped = query_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("KILL QUERY WHERE query_id = '{escaped}' ASYNC")
}
