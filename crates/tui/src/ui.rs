use chtop_core::{DisplayRow, Snapshot};
use chrono::Local;
use ratatui::prelude::*;
use ratatui::widgets::{Clear, Paragraph, Wrap};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::theme::Theme;
use crate::view::{data_capacity, StatusLevel, TableLayout, View, ViewMode};

const PAUSED_BADGE: &str = " PAUSED ";

pub fn render(frame: &mut Frame, view: &mut View, snapshot: &Snapshot, paused: bool) {
    let area = frame.area();
    view.resize(area.width, area.height);
    view.update_viewport(snapshot.len());
    if area.width == 0 || area.height == 0 {
        return;
    }

    let [table_area, status_area] =
        Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(area);

    render_table(frame, view, snapshot, table_area);
    render_status(frame, view, snapshot, paused, status_area);

    match view.mode() {
        ViewMode::ConfirmKill { query_id } => render_confirm(frame, query_id),
        ViewMode::Inspect => {
            if let Some(row) = snapshot.row(view.selected()) {
                render_inspect(frame, row);
            }
        }
        ViewMode::Normal | ViewMode::Select => {}
    }
}

fn render_table(frame: &mut Frame, view: &View, snapshot: &Snapshot, area: Rect) {
    if area.height == 0 {
        return;
    }
    let width = usize::from(area.width);
    let layout = view.layout();
    let state = view.state();
    let selecting = state.mode.has_selection();

    let header_style = if selecting {
        Style::new().fg(Theme::TEXT_SECONDARY)
    } else {
        Style::new().fg(Theme::TEXT_PRIMARY).bold()
    };
    let header = format_row(layout, layout.columns.iter().map(|c| c.title), width);
    let mut lines = vec![Line::styled(header, header_style)];

    let data_lines = usize::from(area.height) - 1;
    if snapshot.is_empty() {
        if data_lines > 0 {
            let msg = if snapshot.is_initial() {
                "Waiting for the first refresh\u{2026}"
            } else {
                "No running queries."
            };
            lines.push(Line::styled(
                fit_width(msg, width),
                Style::new().fg(Theme::TEXT_MUTED).italic(),
            ));
        }
    } else {
        let len = snapshot.len();
        let capacity = data_capacity(len, data_lines);
        let start = if selecting { state.offset.min(len) } else { 0 };
        let end = (start + capacity).min(len);

        for (index, row) in snapshot.rows[start..end].iter().enumerate() {
            let index = start + index;
            let text = format_row(layout, layout.columns.iter().map(|c| c.cell(row)), width);
            let style = if selecting && index == state.selected {
                Style::new()
                    .fg(Theme::TEXT_PRIMARY)
                    .bg(Theme::SELECTED_BG)
                    .bold()
            } else {
                Style::new().fg(Theme::TEXT_PRIMARY)
            };
            lines.push(Line::styled(text, style));
        }

        // The last line is reserved whenever not every row fits; scrolled
        // to the bottom it counts the rows above instead.
        let below = len - end;
        let marker = if below > 0 {
            Some(format!("\u{2026} {below} more (s to select and scroll)"))
        } else if start > 0 {
            Some(format!("\u{2026} {start} above"))
        } else {
            None
        };
        if let Some(marker) = marker.filter(|_| data_lines > 0) {
            lines.push(Line::styled(
                fit_width(&marker, width),
                Style::new().fg(Theme::TEXT_MUTED),
            ));
        }
    }

    frame.render_widget(Paragraph::new(lines), area);
}

fn render_status(frame: &mut Frame, view: &View, snapshot: &Snapshot, paused: bool, area: Rect) {
    let width = usize::from(area.width);
    let status = &view.state().status;
    let mut spans = Vec::new();
    let mut used = 0;

    if paused {
        spans.push(Span::styled(
            PAUSED_BADGE,
            Style::new().fg(Color::Black).bg(Theme::ACCENT_YELLOW).bold(),
        ));
        spans.push(Span::raw(" "));
        used += PAUSED_BADGE.len() + 1;
    }

    let color = match status.level {
        StatusLevel::Info => Theme::TEXT_SECONDARY,
        StatusLevel::Success => Theme::ACCENT_GREEN,
        StatusLevel::Error => Theme::ACCENT_RED,
    };
    let text = fit_width(&status.text, width.saturating_sub(used));
    used += text.width();
    spans.push(Span::styled(text, Style::new().fg(color)));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);

    // Right side: row count and refresh time, only when it fits.
    if let Some(fetched_at) = snapshot.fetched_at {
        let info = format!(
            "{} queries  {} ",
            snapshot.len(),
            fetched_at.with_timezone(&Local).format("%H:%M:%S")
        );
        let info_width = info.width();
        if used + info_width + 2 <= width {
            let info_width = info_width as u16;
            let info_area = Rect::new(
                area.x + area.width - info_width,
                area.y,
                info_width,
                area.height,
            );
            frame.render_widget(
                Paragraph::new(Span::styled(info, Style::new().fg(Theme::TEXT_MUTED))),
                info_area,
            );
        }
    }
}

fn render_confirm(frame: &mut Frame, query_id: &str) {
    let area = frame.area();
    let popup_width = 60u16.min(area.width.saturating_sub(4));
    let popup_height = 7u16.min(area.height.saturating_sub(2));
    let x = (area.width.saturating_sub(popup_width)) / 2;
    let y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(x, y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let key_style = Style::new().fg(Theme::TEXT_KEY);
    let desc_style = Style::new().fg(Theme::TEXT_KEY_DESC);

    let block = Theme::block_warning().title(" Kill query ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let lines = vec![
        Line::raw(""),
        Line::from(Span::styled(
            format!("  {query_id}"),
            Style::new().fg(Theme::TEXT_PRIMARY).bold(),
        )),
        Line::raw(""),
        Line::from(vec![
            Span::styled("  Y ", key_style),
            Span::styled("confirm  ", desc_style),
            Span::styled("any other key ", key_style),
            Span::styled("cancel", desc_style),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_inspect(frame: &mut Frame, row: &DisplayRow) {
    let area = frame.area();
    let popup_area = Rect::new(
        area.x + 2.min(area.width),
        area.y + 1.min(area.height),
        area.width.saturating_sub(4),
        area.height.saturating_sub(3),
    );

    frame.render_widget(Clear, popup_area);
    let block = Theme::block_accent()
        .title(format!(" Query {} ", row.query_id()))
        .padding(Theme::PADDING_COMPACT);
    let p = Paragraph::new(row.original_query().to_string())
        .style(Style::new().fg(Theme::TEXT_PRIMARY))
        .wrap(Wrap { trim: false })
        .block(block);
    frame.render_widget(p, popup_area);
}

/// Lay cells out on the fixed column grid, then cut the line to `max_width`.
///
/// Every column but the last is truncated to its own width; the last one
/// takes whatever room remains.
pub fn format_row<'a>(
    layout: &TableLayout,
    cells: impl IntoIterator<Item = &'a str>,
    max_width: usize,
) -> String {
    let mut line = String::new();
    let last = layout.columns.len().saturating_sub(1);
    for (i, (column, cell)) in layout.columns.iter().zip(cells).enumerate() {
        if i == last {
            line.push_str(cell);
            break;
        }
        line.push_str(&fit_width(cell, column.width));
        let next = layout.starts[i + 1];
        let pad = next.saturating_sub(line.width());
        line.extend(std::iter::repeat_n(' ', pad));
    }
    fit_width(&line, max_width)
}

/// Longest prefix of `text` whose display width is at most `max_width`.
pub fn fit_width(text: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width {
            break;
        }
        width += w;
        out.push(c);
    }
    out
}
