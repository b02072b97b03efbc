use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use chtop_client::QueryClient;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::backend::Backend;
use ratatui::Terminal;
use tracing::{info, warn};

use crate::session::Session;
use crate::signals::ShutdownFlag;
use crate::ui;
use crate::view::{Command, StatusLevel, View};

/// Where terminal events come from.
pub trait InputSource {
    /// Wait at most `timeout` for one event.
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

/// Reads events from the real terminal.
pub struct CrosstermInput;

impl InputSource for CrosstermInput {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        if event::poll(timeout)? {
            event::read().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Drives the dashboard: fetch when due, draw, wait for one event, apply it.
pub struct Controller<C, I> {
    session: Session<C>,
    view: View,
    input: I,
    refresh: Duration,
    last_fetch: Option<Instant>,
    refresh_requested: bool,
    last_fetch_failed: bool,
    shutdown: ShutdownFlag,
}

impl<C: QueryClient, I: InputSource> Controller<C, I> {
    pub fn new(session: Session<C>, view: View, input: I, refresh: Duration) -> Self {
        Self {
            session,
            view,
            input,
            refresh,
            last_fetch: None,
            refresh_requested: false,
            last_fetch_failed: false,
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Close the session once `flag` is raised.
    pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Loop until the session is closed.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        info!("dashboard started, refreshing every {:?}", self.refresh);
        while !self.session.is_closed() {
            self.step(terminal)?;
        }
        info!("dashboard closed");
        Ok(())
    }

    /// One iteration of the loop.
    pub fn step<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        if self.check_shutdown() {
            return Ok(());
        }
        if self.should_fetch() {
            self.fetch();
        }

        let snapshot = self.session.snapshot();
        let paused = self.session.is_paused();
        terminal.draw(|frame| ui::render(frame, &mut self.view, &snapshot, paused))?;

        let wait = self.wait_time();
        if let Some(event) = self.input.next_event(wait)? {
            self.handle_event(event);
        }
        self.check_shutdown();
        Ok(())
    }

    /// Close the session on a pending termination signal; true once closed.
    fn check_shutdown(&mut self) -> bool {
        if self.shutdown.is_set() && !self.session.is_closed() {
            info!("termination signal received, closing");
            self.session.close();
        }
        self.session.is_closed()
    }

    fn should_fetch(&self) -> bool {
        if self.refresh_requested {
            return true;
        }
        if self.auto_refresh_suspended() {
            return false;
        }
        self.last_fetch
            .is_none_or(|at| at.elapsed() >= self.refresh)
    }

    fn auto_refresh_suspended(&self) -> bool {
        self.session.is_paused() || self.view.mode().has_selection()
    }

    /// Time left until the next automatic fetch, never more than one interval.
    ///
    /// With auto-refresh suspended nothing is due, so the wait is a full
    /// interval and only input wakes the loop.
    fn wait_time(&self) -> Duration {
        if self.auto_refresh_suspended() {
            return self.refresh;
        }
        match self.last_fetch {
            Some(at) => self.refresh.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
        .min(self.refresh)
    }

    fn fetch(&mut self) {
        self.refresh_requested = false;
        self.last_fetch = Some(Instant::now());
        match self.session.fetch() {
            Ok(_) => {
                if self.last_fetch_failed {
                    self.last_fetch_failed = false;
                    self.view.reset_status();
                }
            }
            Err(e) => {
                warn!("fetch failed: {e}");
                self.last_fetch_failed = true;
                self.view
                    .set_status(format!("Fetch failed: {e}"), StatusLevel::Error);
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    return;
                }
                let snapshot = self.session.snapshot();
                if let Some(command) = self.view.handle_key(key, &snapshot) {
                    self.apply(command);
                }
            }
            Event::Resize(width, height) => self.view.resize(width, height),
            _ => {}
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Quit => self.session.close(),
            Command::TogglePause => {
                if self.session.toggle_pause() {
                    self.view
                        .set_status("Paused. Press p to resume", StatusLevel::Info);
                } else {
                    // Resume shows fresh data right away.
                    self.last_fetch = None;
                    self.view.set_status("Resumed", StatusLevel::Info);
                }
            }
            Command::ExportFull => match self.session.export_full() {
                Ok(path) => self.view.set_status(
                    format!("Snapshot saved to {}", path.display()),
                    StatusLevel::Success,
                ),
                Err(e) => self
                    .view
                    .set_status(format!("Could not export: {e}"), StatusLevel::Error),
            },
            Command::ExportOne(index) => match self.session.export_one(index) {
                Ok(path) => self.view.set_status(
                    format!("Query saved to {}", path.display()),
                    StatusLevel::Success,
                ),
                Err(e) => self
                    .view
                    .set_status(format!("Could not export: {e}"), StatusLevel::Error),
            },
            Command::Refresh => self.refresh_requested = true,
            Command::Kill { query_id } => {
                match self.session.kill(&query_id) {
                    Ok(reply) if reply.is_empty() => self.view.set_status(
                        format!("Kill sent for {query_id}"),
                        StatusLevel::Success,
                    ),
                    // One tab-separated line per killed query.
                    Ok(reply) => self
                        .view
                        .set_status(reply.replace(['\t', '\r', '\n'], " "), StatusLevel::Success),
                    Err(e) => {
                        warn!("kill {query_id} failed: {e}");
                        self.view
                            .set_status(format!("Kill failed: {e}"), StatusLevel::Error);
                    }
                }
                self.refresh_requested = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chtop_client::testing::RecordingClient;
    use chtop_client::ClientError;
    use chtop_core::testing::process_row;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use crate::session::PROCESSES_QUERY;
    use crate::view::ViewMode;

    /// Hands out one scripted event per call, then nothing.
    #[derive(Default)]
    struct ScriptedInput {
        events: VecDeque<Event>,
        waits: Vec<Duration>,
    }

    impl InputSource for ScriptedInput {
        fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
            self.waits.push(timeout);
            Ok(self.events.pop_front())
        }
    }

    struct Harness {
        controller: Controller<Arc<RecordingClient>, ScriptedInput>,
        client: Arc<RecordingClient>,
        terminal: Terminal<TestBackend>,
        shutdown: ShutdownFlag,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(refresh: Duration) -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let client = Arc::new(RecordingClient::new(vec![
                process_row("q0", "SELECT 1"),
                process_row("q1", "SELECT sleep(3)"),
            ]));
            let session = Session::new(Arc::clone(&client), dir.path().to_path_buf());
            let shutdown = ShutdownFlag::new();
            let controller = Controller::new(
                session,
                View::new(160, 20),
                ScriptedInput::default(),
                refresh,
            )
            .with_shutdown(shutdown.clone());
            Self {
                controller,
                client,
                shutdown,
                terminal: Terminal::new(TestBackend::new(160, 20)).expect("terminal"),
                _dir: dir,
            }
        }

        fn keys(&mut self, codes: &[KeyCode]) {
            for code in codes {
                self.controller
                    .input
                    .events
                    .push_back(Event::Key(KeyEvent::new(*code, KeyModifiers::NONE)));
            }
        }

        fn step(&mut self) {
            self.controller.step(&mut self.terminal).expect("step");
        }

        fn fetches(&self) -> usize {
            self.client.count(PROCESSES_QUERY)
        }
    }

    #[test]
    fn first_step_fetches_and_interval_gates_the_next() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.step();
        h.step();
        assert_eq!(h.fetches(), 1);
        assert_eq!(h.controller.session().snapshot().len(), 2);
        assert!(h.controller.input.waits[1] <= Duration::from_secs(3600));
        assert!(h.controller.input.waits[1] > Duration::ZERO);
    }

    #[test]
    fn paused_session_does_not_fetch_until_resumed() {
        let refresh = Duration::from_secs(3600);
        let mut h = Harness::new(refresh);
        h.keys(&[KeyCode::Char('p')]);
        h.step();
        assert!(h.controller.session().is_paused());
        assert_eq!(h.fetches(), 1);

        for _ in 0..5 {
            h.step();
        }
        assert_eq!(h.fetches(), 1);
        assert!(h.controller.input.waits[1..].iter().all(|w| *w == refresh));

        h.keys(&[KeyCode::Char('p')]);
        h.step();
        assert!(!h.controller.session().is_paused());
        // The interval is an hour away; resuming alone makes the next step fetch.
        h.step();
        assert_eq!(h.fetches(), 2);
        h.step();
        assert_eq!(h.fetches(), 2);
    }

    #[test]
    fn suspended_refresh_waits_a_full_interval() {
        let refresh = Duration::from_millis(50);
        let mut h = Harness::new(refresh);
        h.keys(&[KeyCode::Char('s')]);
        h.step();
        std::thread::sleep(Duration::from_millis(80));
        for _ in 0..3 {
            h.step();
        }
        assert_eq!(h.fetches(), 1);
        assert!(h.controller.input.waits[1..].iter().all(|w| *w == refresh));

        h.keys(&[KeyCode::Esc, KeyCode::Char('p')]);
        h.step();
        h.step();
        assert!(h.controller.session().is_paused());
        std::thread::sleep(Duration::from_millis(80));
        h.step();
        assert_eq!(h.controller.input.waits.last(), Some(&refresh));
    }

    #[test]
    fn shutdown_flag_closes_the_session() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.step();
        assert_eq!(h.fetches(), 1);
        assert!(!h.controller.session().is_closed());

        h.shutdown.trigger();
        h.controller.run(&mut h.terminal).expect("run");
        assert!(h.controller.session().is_closed());
        assert_eq!(h.fetches(), 1);
    }

    #[test]
    fn select_mode_refreshes_only_on_request() {
        let mut h = Harness::new(Duration::ZERO);
        h.keys(&[KeyCode::Char('s')]);
        h.step();
        assert_eq!(h.fetches(), 1);
        h.step();
        h.step();
        assert_eq!(h.fetches(), 1);

        h.keys(&[KeyCode::Char('r')]);
        h.step();
        h.step();
        assert_eq!(h.fetches(), 2);
        h.step();
        assert_eq!(h.fetches(), 2);
    }

    #[test]
    fn confirmed_kill_runs_once_then_refreshes() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.client.set_text_response("waiting\tq1\tdefault\tSELECT sleep(3)\n");
        h.keys(&[
            KeyCode::Char('s'),
            KeyCode::Down,
            KeyCode::Char('k'),
            KeyCode::Char('Y'),
        ]);
        for _ in 0..4 {
            h.step();
        }
        assert_eq!(h.client.count("KILL QUERY"), 1);
        assert_eq!(h.fetches(), 1);
        assert_eq!(
            h.controller.view().state().status.text,
            "waiting q1 default SELECT sleep(3)"
        );

        h.step();
        assert_eq!(h.fetches(), 2);
        assert_eq!(h.client.count("KILL QUERY"), 1);
        assert_eq!(h.controller.view().mode(), &ViewMode::Select);
    }

    #[test]
    fn declined_kill_sends_nothing() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.keys(&[KeyCode::Char('s'), KeyCode::Char('k'), KeyCode::Char('y')]);
        for _ in 0..4 {
            h.step();
        }
        assert_eq!(h.client.count("KILL"), 0);
        assert_eq!(h.controller.view().state().status.text, "Kill cancelled");
    }

    #[test]
    fn fetch_failure_lands_on_status_line() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.client
            .fail_next(ClientError::Timeout(Duration::from_secs(2)));
        h.step();
        let status = &h.controller.view().state().status;
        assert_eq!(status.level, StatusLevel::Error);
        assert!(status.text.starts_with("Fetch failed"));
        assert!(h.controller.session().snapshot().is_initial());

        h.keys(&[KeyCode::Char('s'), KeyCode::Char('r')]);
        h.step();
        h.step();
        h.step();
        assert_eq!(h.controller.session().snapshot().len(), 2);
        assert_ne!(h.controller.view().state().status.level, StatusLevel::Error);
    }

    #[test]
    fn export_reports_the_written_path() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.keys(&[KeyCode::Char('e')]);
        h.step();
        let status = h.controller.view().state().status.clone();
        assert_eq!(status.level, StatusLevel::Success);
        assert!(status.text.contains("chtop-processes-"));
    }

    #[test]
    fn release_events_are_ignored_and_resize_updates_geometry() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.controller.input.events.push_back(Event::Key(KeyEvent::new_with_kind(
            KeyCode::Char('q'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
        )));
        h.controller.input.events.push_back(Event::Resize(90, 12));
        h.step();
        h.step();
        assert!(!h.controller.session().is_closed());
        assert_eq!(h.controller.view().size(), (90, 12));
    }

    #[test]
    fn quit_ends_the_run_loop() {
        let mut h = Harness::new(Duration::from_secs(3600));
        h.keys(&[KeyCode::Down, KeyCode::Char('q')]);
        h.controller.run(&mut h.terminal).expect("run");
        assert!(h.controller.session().is_closed());
        assert_eq!(h.fetches(), 1);
    }
}
