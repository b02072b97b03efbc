use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub const LOG_FILE_NAME: &str = "chtop.log";

/// Install the global subscriber when `CHTOP_LOG` is set.
///
/// The screen belongs to the dashboard, so events go to a file in the temp
/// directory instead of stderr. Returns the log path when logging is on.
pub fn init(config: &Config) -> Result<Option<PathBuf>> {
    let Some(filter) = config.log_filter.as_deref() else {
        return Ok(None);
    };

    let path = std::env::temp_dir().join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_new(filter)
        .with_context(|| format!("Invalid CHTOP_LOG filter {filter:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(Some(path))
}
