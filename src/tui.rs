//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the stores, their dev servers, and the selected server's logs using
//! `ratatui`. Everything shown about servers is read from the `Supervisor` per frame.

use std::collections::HashMap;
use std::io::{self, Stdout};
use std::sync::OnceLock;

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Terminal;
use regex::Regex;

use crate::app::{format_uptime, App, InputMode, StatusLevel};
use crate::output::{sanitize_text, StreamKind, STOPPED_SENTINEL};
use crate::supervisor::Supervisor;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const HELP_LINE: &str =
    "↑/↓ select | s start | x stop | X stop all | Enter input | y copy url | PgUp/PgDn scroll | ? help | q quit";

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, supervisor: &Supervisor, terminal: &mut TuiTerminal) -> io::Result<()> {
    let title = match app.selected_store() {
        Some(store) => format!("themerack · {}", store.name),
        None => "themerack".to_string(),
    };
    execute!(terminal.backend_mut(), SetTitle(title))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(4)])
            .split(area);
        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
            .split(vertical[0]);
        let border_style = Style::default().fg(Color::DarkGray);

        let active: HashMap<String, _> = supervisor
            .list_active()
            .into_iter()
            .map(|process| (process.name().to_string(), process))
            .collect();
        let items: Vec<ListItem> = app
            .stores
            .iter()
            .enumerate()
            .map(|(idx, store)| {
                let selected = idx == app.selected;
                let server = active.get(&store.name);
                let (marker, marker_style) = if server.is_some() {
                    ("●", Style::default().fg(Color::Green))
                } else {
                    ("○", Style::default().fg(Color::DarkGray))
                };
                let name_style = if selected {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };
                let detail = match server {
                    Some(server) => format!(
                        "{} · {}",
                        server.url(),
                        format_uptime(server.uptime())
                    ),
                    None if store.path.is_none() => format!("{} [not fetched]", store.url),
                    None => format!("{} [{}]", store.url, store.method.label()),
                };
                let width = (main[0].width as usize).saturating_sub(6);
                ListItem::new(Text::from(vec![
                    Line::from(vec![
                        Span::styled(if selected { "▶ " } else { "  " }, Style::default().fg(Color::Cyan)),
                        Span::styled(format!("{} ", marker), marker_style),
                        Span::styled(store.name.clone(), name_style),
                    ]),
                    Line::from(vec![
                        Span::raw("    "),
                        Span::styled(truncate(&detail, width), Style::default().fg(Color::DarkGray)),
                    ]),
                ]))
            })
            .collect();
        let list_title = format!("Stores ({} running)", active.len());
        let list = List::new(items).block(
            Block::default()
                .title(list_title)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        let mut state = ListState::default();
        if !app.stores.is_empty() {
            state.select(Some(app.selected.min(app.stores.len() - 1)));
        }
        frame.render_stateful_widget(list, main[0], &mut state);

        let process = app
            .selected_store()
            .and_then(|store| supervisor.last(&store.name));
        let log_title = match (&process, app.selected_store()) {
            (Some(process), _) if process.is_live() => {
                format!("Logs - {} ({})", process.name(), process.url())
            }
            (Some(process), _) => format!("Logs - {} (stopped)", process.name()),
            (None, Some(store)) => format!("Logs - {}", store.name),
            (None, None) => "Logs".to_string(),
        };
        let input_active = app.input_mode == InputMode::Input;
        let log_block = Block::default()
            .title(log_title)
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(if input_active {
                Style::default().fg(Color::Green)
            } else {
                border_style
            });
        let log_area = log_block.inner(main[1]);
        let height = log_area.height as usize;
        app.set_log_view_height(height);

        let logs = process.as_ref().map(|p| p.read_log_lines()).unwrap_or_default();
        app.clamp_scroll(logs.len());
        let (start, end) = visible_range(logs.len(), height, app.scroll_back);
        let lines: Vec<Line<'static>> = logs[start..end]
            .iter()
            .map(|line| highlight_line(&sanitize_text(&line.text, true), line.stream))
            .collect();
        frame.render_widget(Paragraph::new(Text::from(lines)).block(log_block), main[1]);
        if logs.is_empty() {
            let hint = if process.is_some() {
                "Waiting for server output..."
            } else {
                "No dev server. Press s to start one."
            };
            let empty = Paragraph::new(hint).style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, log_area);
        }

        let status_line = status_line(app, supervisor, logs.len());
        let help = match app.input_mode {
            InputMode::Input => Line::from(Span::styled(
                "INPUT ▌ keys go to the dev server · Esc or Ctrl+Q to leave",
                Style::default().fg(Color::Green),
            )),
            InputMode::Normal => match app.status_message() {
                Some((text, StatusLevel::Warning)) => {
                    Line::from(Span::styled(text.to_string(), Style::default().fg(Color::Yellow)))
                }
                Some((text, StatusLevel::Info)) => Line::from(Span::raw(text.to_string())),
                None => Line::from(Span::styled(HELP_LINE, Style::default().fg(Color::DarkGray))),
            },
        };
        let status = Paragraph::new(Text::from(vec![Line::from(Span::raw(status_line)), help])).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        frame.render_widget(status, vertical[1]);

        if app.show_help {
            let popup_area = centered_rect(60, 60, area);
            let help_text = [
                "Navigation:",
                "  Up/Down    Select store",
                "  Tab        Cycle selection",
                "  PageUp/Dn  Scroll logs",
                "  Home/End   Scroll to top/bottom",
                "",
                "Dev servers:",
                "  s          Start server for selected store",
                "  x          Stop selected server",
                "  X          Stop ALL servers",
                "  y          Copy server URL",
                "  Enter      Forward keys to the server (Esc leaves)",
                "",
                "General:",
                "  ?          Toggle this help",
                "  q          Stop all servers and quit",
            ]
            .join("\n");
            let help_block = Paragraph::new(help_text)
                .block(
                    Block::default()
                        .title("Help")
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded),
                )
                .style(Style::default().bg(Color::DarkGray).fg(Color::White));
            frame.render_widget(Clear, popup_area);
            frame.render_widget(help_block, popup_area);
        }
    })?;
    Ok(())
}

fn status_line(app: &App, supervisor: &Supervisor, lines: usize) -> String {
    let Some(store) = app.selected_store() else {
        return "No stores registered (themerack stores add <name> <url>)".to_string();
    };
    match supervisor.get(&store.name) {
        Some(server) => format!(
            "{} | port: {} | pid: {} | up: {} | lines: {} | follow: {} | input: {}",
            store.name,
            server.port(),
            server
                .pid()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into()),
            format_uptime(server.uptime()),
            lines,
            if app.is_following() { "on" } else { "off" },
            if app.input_mode == InputMode::Input { "on" } else { "off" },
        ),
        None => format!("{} | stopped | lines: {}", store.name, lines),
    }
}

// Window of `height` lines ending `scroll_back` lines before the newest.
fn visible_range(total: usize, height: usize, scroll_back: usize) -> (usize, usize) {
    let end = total.saturating_sub(scroll_back);
    let start = end.saturating_sub(height);
    (start, end)
}

fn url_regex() -> Option<&'static Regex> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://[^\s)>\]]+").ok())
        .as_ref()
}

// Errors in red, the stop sentinel dimmed, URLs green and underlined, other
// stderr text yellow.
fn highlight_line(text: &str, stream: StreamKind) -> Line<'static> {
    if text == STOPPED_SENTINEL {
        return Line::from(Span::styled(
            text.to_string(),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ));
    }
    if text.contains("error") || text.contains("Error") {
        return Line::from(Span::styled(text.to_string(), Style::default().fg(Color::Red)));
    }
    let plain = if stream == StreamKind::Stderr {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let Some(regex) = url_regex() else {
        return Line::from(Span::styled(text.to_string(), plain));
    };
    let url_style = Style::default()
        .fg(Color::Green)
        .add_modifier(Modifier::UNDERLINED);
    let mut spans = Vec::new();
    let mut last = 0;
    for found in regex.find_iter(text) {
        if found.start() > last {
            spans.push(Span::styled(text[last..found.start()].to_string(), plain));
        }
        spans.push(Span::styled(found.as_str().to_string(), url_style));
        last = found.end();
    }
    if last < text.len() {
        spans.push(Span::styled(text[last..].to_string(), plain));
    }
    Line::from(spans)
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}
