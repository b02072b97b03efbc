use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use chtop_client::testing::RecordingClient;
use chtop_core::testing::process_row;
use chtop_tui::{
    Controller, InputSource, Session, ShutdownFlag, StatusLevel, View, ViewMode, PROCESSES_QUERY,
};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::backend::TestBackend;
use ratatui::Terminal;

struct Script(VecDeque<Event>);

impl Script {
    fn keys(codes: &[KeyCode]) -> Self {
        Self(
            codes
                .iter()
                .map(|code| Event::Key(KeyEvent::new(*code, KeyModifiers::NONE)))
                .collect(),
        )
    }
}

impl InputSource for Script {
    fn next_event(&mut self, _timeout: Duration) -> io::Result<Option<Event>> {
        // Running out of script means the operator walked away: quit.
        Ok(Some(self.0.pop_front().unwrap_or_else(|| {
            Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
        })))
    }
}

fn run(
    client: &Arc<RecordingClient>,
    script: Script,
    dir: &std::path::Path,
) -> Controller<Arc<RecordingClient>, Script> {
    let session = Session::new(Arc::clone(client), dir.to_path_buf());
    let mut controller =
        Controller::new(session, View::new(140, 24), script, Duration::from_secs(3600));
    let mut terminal = Terminal::new(TestBackend::new(140, 24)).expect("terminal");
    controller.run(&mut terminal).expect("run");
    controller
}

#[test]
fn ctrl_c_closes_session_after_first_fetch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(RecordingClient::new(vec![process_row("a", "SELECT 1")]));
    let controller = run(&client, Script::keys(&[]), dir.path());
    assert!(controller.session().is_closed());
    assert_eq!(client.count(PROCESSES_QUERY), 1);
}

#[test]
fn select_refresh_kill_and_export_in_one_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(RecordingClient::new(vec![
        process_row("a", "SELECT 1"),
        process_row("b", "SELECT\n  sleep(3)"),
    ]));
    client.set_text_response("waiting\tb\tdefault\n");

    let controller = run(
        &client,
        Script::keys(&[
            KeyCode::Char('s'),
            KeyCode::Down,
            KeyCode::Char('r'),
            KeyCode::Char('e'),
            KeyCode::Char('k'),
            KeyCode::Char('Y'),
            KeyCode::Char('q'),
        ]),
        dir.path(),
    );

    assert_eq!(client.count("KILL QUERY WHERE query_id = 'b'"), 1);
    // initial, manual refresh, post-kill refresh
    assert_eq!(client.count(PROCESSES_QUERY), 3);
    assert_eq!(controller.view().mode(), &ViewMode::Select);

    let exported: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    assert_eq!(exported.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&exported[0]).expect("read"),
        "SELECT\n  sleep(3)"
    );
}

#[test]
fn empty_process_list_keeps_every_key_harmless() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(RecordingClient::new(Vec::new()));
    let controller = run(
        &client,
        Script::keys(&[
            KeyCode::Char('s'),
            KeyCode::Down,
            KeyCode::Up,
            KeyCode::Char('k'),
            KeyCode::Char('e'),
        ]),
        dir.path(),
    );
    assert_eq!(client.count("KILL"), 0);
    assert_eq!(controller.view().state().status.level, StatusLevel::Error);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn raised_shutdown_flag_ends_the_loop_before_any_fetch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(RecordingClient::new(vec![process_row("a", "SELECT 1")]));
    let shutdown = ShutdownFlag::new();
    shutdown.trigger();

    let session = Session::new(Arc::clone(&client), dir.path().to_path_buf());
    let mut controller = Controller::new(
        session,
        View::new(140, 24),
        Script::keys(&[KeyCode::Char('s')]),
        Duration::from_secs(3600),
    )
    .with_shutdown(shutdown);
    let mut terminal = Terminal::new(TestBackend::new(140, 24)).expect("terminal");
    controller.run(&mut terminal).expect("run");

    assert!(controller.session().is_closed());
    assert_eq!(client.count(PROCESSES_QUERY), 0);
}
