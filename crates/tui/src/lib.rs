mod config;
mod controller;
mod export;
mod logging;
mod session;
mod signals;
mod terminal;
mod theme;
mod ui;
mod view;

pub use config::Config;
pub use controller::{Controller, CrosstermInput, InputSource};
pub use session::{Session, SessionError, PROCESSES_QUERY};
pub use signals::ShutdownFlag;
pub use view::{Command, StatusLevel, StatusLine, View, ViewMode, ViewState};

use anyhow::{Context, Result};
use chtop_client::HttpQueryClient;
use tracing::info;

use crate::terminal::TerminalGuard;

/// Launch the dashboard against the configured server.
pub fn run() -> Result<()> {
    run_with_config(config::load())
}

pub fn run_with_config(config: Config) -> Result<()> {
    if let Some(path) = logging::init(&config)? {
        info!("logging to {}", path.display());
    }
    config.warn_ignored();

    let mut client = HttpQueryClient::new(&config.url, config.timeout)
        .with_context(|| format!("Invalid server URL {:?}", config.url))?;
    if config.user.is_some() || config.password.is_some() {
        let user = config.user.clone().unwrap_or_else(|| "default".to_string());
        client.set_auth(user, config.password.clone());
    }
    info!("connecting to {}", client.base_url());

    let session = Session::new(client, config.export_dir.clone());

    let shutdown = ShutdownFlag::new();
    signals::watch(shutdown.clone())?;

    let mut guard = TerminalGuard::enter().context("Failed to initialize terminal")?;
    let size = guard.terminal().size().context("Failed to read terminal size")?;
    let view = View::new(size.width, size.height);

    let mut controller =
        Controller::new(session, view, CrosstermInput, config.refresh).with_shutdown(shutdown);
    let result = controller.run(guard.terminal());
    drop(guard);
    result
}
