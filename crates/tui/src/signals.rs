use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Raised once SIGINT or SIGTERM reaches the process.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Listen for termination signals on a background thread and raise `flag`.
///
/// The dashboard loop polls the flag, so the terminal is restored by the
/// normal exit path instead of the process dying in raw mode.
pub fn watch(flag: ShutdownFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal listener")?;

    thread::Builder::new()
        .name("chtop-signals".to_string())
        .spawn(move || {
            if runtime.block_on(wait_for_shutdown()) {
                flag.trigger();
            }
        })
        .context("Failed to spawn signal listener")?;
    Ok(())
}

/// Wait for SIGTERM or SIGINT. False when no handler could be installed.
#[cfg(unix)]
async fn wait_for_shutdown() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!("signal handlers unavailable: {e}");
                return false;
            }
        };
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
    true
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received Ctrl+C");
            true
        }
        Err(e) => {
            warn!("Ctrl+C handler unavailable: {e}");
            false
        }
    }
}
