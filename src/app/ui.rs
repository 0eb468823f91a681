// Handles the rendering of the poll view to the terminal frame.

use super::{PollStatus, Verdict};
use super::model::{ACTIVE_STATE, LOAD_ERROR, LOAD_STATE, ManagedBy};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph},
};

/// Main render function called after every detection and every key press.
pub fn render(f: &mut Frame, status: &PollStatus, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, chunks[0], status);
    render_gauge(f, chunks[1], status);
    render_descriptor(f, chunks[2], status, list_state);
    render_footer(f, chunks[3], status);
}

fn render_header(f: &mut Frame, area: Rect, status: &PollStatus) {
    let (symbol, color) = if !status.found {
        ("?", Color::Yellow)
    } else if status.descriptor.is_running() {
        ("●", Color::Green)
    } else if status.descriptor.active_state() == Some("failed") {
        ("✖", Color::Red)
    } else {
        ("○", Color::DarkGray)
    };

    let target = status
        .desired_state
        .map(|state| state.as_str())
        .unwrap_or("status only");
    let managed = match status.managed_by {
        Some(ManagedBy::SystemdManaged) => "systemd",
        Some(ManagedBy::InitScriptOnly) => "init script",
        None => "not found",
    };

    let line = Line::from(vec![
        Span::styled(format!("{symbol} "), Style::default().fg(color)),
        Span::styled(
            status.unit.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  target: {target}")),
        Span::styled(format!("  [{managed}]"), Style::default().fg(Color::Gray)),
        Span::raw(format!("  poll #{}", status.iteration)),
    ]);

    let paragraph =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(" Service "));
    f.render_widget(paragraph, area);
}

fn render_gauge(f: &mut Frame, area: Rect, status: &PollStatus) {
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Timeout "))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(status.progress_ratio())
        .label(format!(
            "{}s / {}s",
            status.elapsed.as_secs(),
            status.timeout.as_secs()
        ));
    f.render_widget(gauge, area);
}

fn render_descriptor(f: &mut Frame, area: Rect, status: &PollStatus, state: &mut ListState) {
    let items: Vec<ListItem> = status
        .descriptor
        .iter()
        .map(|(key, value)| {
            let key_style = match key {
                ACTIVE_STATE | LOAD_STATE => Style::default().fg(Color::Cyan),
                LOAD_ERROR => Style::default().fg(Color::Red),
                _ => Style::default().fg(Color::Gray),
            };
            // Multi-line Exec* values only show their first line here.
            let value = value.lines().next().unwrap_or_default();

            ListItem::new(Line::from(vec![
                Span::styled(format!("{key:<28}"), key_style),
                Span::raw(value.to_string()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Descriptor "))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, state);
}

fn render_footer(f: &mut Frame, area: Rect, status: &PollStatus) {
    let line = match &status.verdict {
        None => Line::from(vec![Span::styled(
            "Polling...",
            Style::default().fg(Color::Yellow),
        )]),
        Some(verdict) => {
            let outcome = match verdict {
                Verdict::Ready => Span::styled("✔ ready ", Style::default().fg(Color::Green)),
                Verdict::Failed(msg) => {
                    Span::styled(format!("✖ {msg} "), Style::default().fg(Color::Red))
                }
            };
            Line::from(vec![
                outcome,
                Span::raw("| Scroll: "),
                Span::styled("j/k ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("| Quit: "),
                Span::styled("q", Style::default().fg(Color::Red)),
            ])
        }
    };

    let paragraph =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(" Result "));
    f.render_widget(paragraph, area);
}
