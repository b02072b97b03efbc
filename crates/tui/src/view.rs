use chtop_core::{DisplayRow, Snapshot};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub const NORMAL_HELP: &str = "q quit  p pause/resume  e export snapshot  s select";
pub const SELECT_HELP: &str =
    "\u{2191}/\u{2193} move  r refresh  e export query  f full query  k kill  Esc back  q quit";

/// Which screen mode the dashboard is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    Normal,
    Select,
    /// Waiting for the operator to confirm killing `query_id`.
    ConfirmKill { query_id: String },
    /// Full query text of the selected row shown as an overlay.
    Inspect,
}

impl ViewMode {
    /// True in every mode that shows a selected row.
    pub fn has_selection(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

/// Status line severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub level: StatusLevel,
}

/// Requests the view hands back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    TogglePause,
    ExportFull,
    ExportOne(usize),
    Refresh,
    Kill { query_id: String },
}

/// One fixed-width table column.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub title: &'static str,
    pub width: usize,
    cell: fn(&DisplayRow) -> &str,
}

impl Column {
    pub fn cell<'a>(&self, row: &'a DisplayRow) -> &'a str {
        (self.cell)(row)
    }
}

pub const COLUMN_GAP: usize = 2;

pub const COLUMNS: [Column; 7] = [
    Column {
        title: "ID",
        width: 36,
        cell: DisplayRow::query_id,
    },
    Column {
        title: "User",
        width: 13,
        cell: |row| row.core(chtop_core::CoreField::User),
    },
    Column {
        title: "PUser",
        width: 10,
        cell: DisplayRow::proxy_user,
    },
    Column {
        title: "Host",
        width: 25,
        cell: |row| row.core(chtop_core::CoreField::Address),
    },
    Column {
        title: "RAddress",
        width: 15,
        cell: DisplayRow::remote_host,
    },
    Column {
        title: "Time",
        width: 15,
        cell: |row| row.core(chtop_core::CoreField::Elapsed),
    },
    Column {
        title: "Query",
        width: 60,
        cell: DisplayRow::flat_query,
    },
];

/// Column start offsets, computed once.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub columns: &'static [Column],
    pub starts: Vec<usize>,
}

impl TableLayout {
    pub fn new(columns: &'static [Column]) -> Self {
        let mut starts = Vec::with_capacity(columns.len());
        let mut x = 0;
        for column in columns {
            starts.push(x);
            x += column.width + COLUMN_GAP;
        }
        Self { columns, starts }
    }
}

/// Mode, selection and viewport of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub mode: ViewMode,
    pub selected: usize,
    pub offset: usize,
    pub status: StatusLine,
}

/// Terminal geometry plus [`ViewState`]; turns keys into [`Command`]s.
pub struct View {
    width: u16,
    height: u16,
    layout: TableLayout,
    state: ViewState,
}

impl View {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            layout: TableLayout::new(&COLUMNS),
            state: ViewState {
                mode: ViewMode::Normal,
                selected: 0,
                offset: 0,
                status: StatusLine {
                    text: NORMAL_HELP.to_string(),
                    level: StatusLevel::Info,
                },
            },
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn mode(&self) -> &ViewMode {
        &self.state.mode
    }

    pub fn selected(&self) -> usize {
        self.state.selected
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    pub fn set_status(&mut self, text: impl Into<String>, level: StatusLevel) {
        self.state.status = StatusLine {
            text: text.into(),
            level,
        };
    }

    /// Put the current mode's key help back on the status line.
    pub fn reset_status(&mut self) {
        let help = match self.state.mode {
            ViewMode::Normal => NORMAL_HELP,
            _ => SELECT_HELP,
        };
        self.set_status(help, StatusLevel::Info);
    }

    /// Data rows that fit below the header, one line kept for the status bar.
    pub fn table_lines(&self) -> usize {
        usize::from(self.height).saturating_sub(2)
    }

    /// Clamp the selection to `len` rows and scroll it into view.
    pub fn update_viewport(&mut self, len: usize) {
        self.state.selected = self.state.selected.min(len.saturating_sub(1));
        if !self.state.mode.has_selection() {
            self.state.offset = 0;
            return;
        }
        let capacity = data_capacity(len, self.table_lines());
        self.state.offset = follow_selection(self.state.offset, self.state.selected, capacity)
            .min(len.saturating_sub(capacity));
    }

    /// Apply one key press; returns the command the controller should run.
    pub fn handle_key(&mut self, key: KeyEvent, snapshot: &Snapshot) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::Quit);
        }

        match self.state.mode.clone() {
            ViewMode::Normal => self.handle_normal_key(key.code),
            ViewMode::Select => self.handle_select_key(key.code, snapshot),
            ViewMode::ConfirmKill { query_id } => {
                self.state.mode = ViewMode::Select;
                if key.code == KeyCode::Char('Y') {
                    Some(Command::Kill { query_id })
                } else {
                    self.set_status("Kill cancelled", StatusLevel::Info);
                    None
                }
            }
            ViewMode::Inspect => {
                self.state.mode = ViewMode::Select;
                self.reset_status();
                None
            }
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> Option<Command> {
        match code {
            KeyCode::Char('q') => Some(Command::Quit),
            KeyCode::Char('p') => Some(Command::TogglePause),
            KeyCode::Char('e') => Some(Command::ExportFull),
            KeyCode::Char('s') | KeyCode::Enter => {
                self.state.mode = ViewMode::Select;
                self.reset_status();
                None
            }
            _ => {
                self.reset_status();
                None
            }
        }
    }

    fn handle_select_key(&mut self, code: KeyCode, snapshot: &Snapshot) -> Option<Command> {
        let len = snapshot.len();
        match code {
            KeyCode::Up => {
                self.state.selected = self.state.selected.saturating_sub(1);
                None
            }
            KeyCode::Down => {
                if self.state.selected + 1 < len {
                    self.state.selected += 1;
                }
                None
            }
            KeyCode::Char('r') => {
                self.set_status("Refreshing\u{2026}", StatusLevel::Info);
                Some(Command::Refresh)
            }
            KeyCode::Char('e') => {
                if self.state.selected < len {
                    Some(Command::ExportOne(self.state.selected))
                } else {
                    self.set_status("No query selected", StatusLevel::Error);
                    None
                }
            }
            KeyCode::Char('f') => {
                if self.state.selected < len {
                    self.state.mode = ViewMode::Inspect;
                    self.set_status("Any key to close", StatusLevel::Info);
                } else {
                    self.set_status("No query selected", StatusLevel::Error);
                }
                None
            }
            KeyCode::Char('k') => {
                match snapshot.row(self.state.selected) {
                    Some(row) => {
                        let query_id = row.query_id().to_string();
                        self.set_status(
                            format!("Kill query {query_id}? Press Y to confirm, any other key to cancel"),
                            StatusLevel::Error,
                        );
                        self.state.mode = ViewMode::ConfirmKill { query_id };
                    }
                    None => self.set_status("No query selected", StatusLevel::Error),
                }
                None
            }
            KeyCode::Esc | KeyCode::Char('s') => {
                self.state.mode = ViewMode::Normal;
                self.state.offset = 0;
                self.reset_status();
                None
            }
            KeyCode::Char('q') => Some(Command::Quit),
            _ => {
                self.reset_status();
                None
            }
        }
    }
}

/// How many data rows fit in `lines`, leaving one for the truncation marker
/// when not every row fits.
pub fn data_capacity(len: usize, lines: usize) -> usize {
    if len > lines {
        lines.saturating_sub(1)
    } else {
        lines
    }
}

/// New scroll offset: unchanged while the selection is visible, otherwise
/// re-centred on the selection.
pub fn follow_selection(offset: usize, selected: usize, capacity: usize) -> usize {
    if capacity == 0 {
        return selected;
    }
    if selected < offset || selected >= offset + capacity {
        selected.saturating_sub(capacity / 2)
    } else {
        offset
    }
}
