//! Application state and key handling for the dev-server view.
//!
//! `App` holds what the terminal view needs between frames: the registered
//! stores, which one is selected, the log scroll position, and the status line.
//! Server state itself is read from the `Supervisor` on every draw. Key and mouse
//! events are translated into `AppAction`s that `main` carries out.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::store::StoreRef;

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation mode.
    Normal,
    /// Keystrokes are forwarded to the selected dev server's stdin.
    Input,
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Exit the application (stopping every server first).
    Quit,
    /// Start the dev server for a store.
    Start(String),
    /// Stop the dev server for a store.
    Stop(String),
    /// Stop every dev server.
    StopAll,
    /// Send raw bytes to a store's dev server.
    SendInput(String, Vec<u8>),
    /// Copy a store's dev-server URL to the clipboard.
    CopyUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
    level: StatusLevel,
}

/// The main application state container.
#[derive(Debug)]
pub struct App {
    /// Registered stores, in store-file order.
    pub stores: Vec<StoreRef>,
    /// Index of the currently selected store.
    pub selected: usize,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Lines scrolled back from the newest log line; 0 follows the tail.
    pub scroll_back: usize,
    /// Height of the log view area (for page scrolling).
    pub log_view_height: usize,
    /// Whether to show the help overlay.
    pub show_help: bool,
    /// Flag indicating if the application should exit.
    pub should_quit: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(stores: Vec<StoreRef>) -> Self {
        Self {
            stores,
            selected: 0,
            input_mode: InputMode::Normal,
            scroll_back: 0,
            log_view_height: 0,
            show_help: false,
            should_quit: false,
            status_message: None,
        }
    }

    pub fn selected_store(&self) -> Option<&StoreRef> {
        self.stores.get(self.selected)
    }

    /// Selects a store by name. Returns `false` if it is not registered.
    pub fn select(&mut self, name: &str) -> bool {
        match self.stores.iter().position(|store| store.name == name) {
            Some(idx) => {
                self.set_selected(idx);
                true
            }
            None => false,
        }
    }

    pub fn is_following(&self) -> bool {
        self.scroll_back == 0
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        match self.input_mode {
            InputMode::Normal => self.handle_normal_input(key),
            InputMode::Input => self.handle_input_key(key),
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> AppAction {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.scroll_up(3),
            MouseEventKind::ScrollDown => self.scroll_down(3),
            _ => {}
        }
        AppAction::None
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> AppAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if key.code == KeyCode::Esc || (ctrl && key.code == KeyCode::Char('q')) {
            self.input_mode = InputMode::Normal;
            return AppAction::None;
        }
        let Some(name) = self.selected_store().map(|store| store.name.clone()) else {
            self.input_mode = InputMode::Normal;
            return AppAction::None;
        };
        match key_bytes(key) {
            Some(bytes) => {
                self.scroll_back = 0;
                AppAction::SendInput(name, bytes)
            }
            None => AppAction::None,
        }
    }

    fn handle_normal_input(&mut self, key: KeyEvent) -> AppAction {
        if self.show_help {
            self.show_help = false;
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc) {
                return AppAction::None;
            }
        }
        let selected_name = self.selected_store().map(|store| store.name.clone());
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if self.selected > 0 {
                    self.set_selected(self.selected - 1);
                }
                AppAction::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.stores.len() {
                    self.set_selected(self.selected + 1);
                }
                AppAction::None
            }
            KeyCode::Tab => {
                if !self.stores.is_empty() {
                    self.set_selected((self.selected + 1) % self.stores.len());
                }
                AppAction::None
            }
            KeyCode::Char('s') => selected_name.map(AppAction::Start).unwrap_or(AppAction::None),
            KeyCode::Char('x') => selected_name.map(AppAction::Stop).unwrap_or(AppAction::None),
            KeyCode::Char('X') => AppAction::StopAll,
            KeyCode::Char('y') => selected_name.map(AppAction::CopyUrl).unwrap_or(AppAction::None),
            KeyCode::Enter | KeyCode::Char('i') => {
                if selected_name.is_some() {
                    self.input_mode = InputMode::Input;
                    self.scroll_back = 0;
                }
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                AppAction::None
            }
            KeyCode::PageUp => {
                self.scroll_up(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll_down(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.scroll_back = usize::MAX;
                AppAction::None
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.scroll_back = 0;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.scroll_back = self.scroll_back.saturating_add(amount);
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(amount);
    }

    /// Clamps the scroll position to the current log length and view height.
    pub fn clamp_scroll(&mut self, total_lines: usize) {
        let max = total_lines.saturating_sub(self.log_view_height.max(1));
        self.scroll_back = self.scroll_back.min(max);
    }

    pub fn set_log_view_height(&mut self, height: usize) {
        self.log_view_height = height;
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        let message = self.status_message.as_ref()?;
        let still_visible = match message.ttl {
            Some(ttl) => message.at.elapsed() < ttl,
            None => true,
        };
        still_visible.then_some((message.text.as_str(), message.level))
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Info, Some(Duration::from_secs(3)));
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(
            message,
            StatusLevel::Warning,
            Some(Duration::from_secs(5)),
        );
    }

    pub fn set_status_warning_persistent(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Warning, None);
    }

    fn set_status_message_with_level(
        &mut self,
        message: impl Into<String>,
        level: StatusLevel,
        ttl: Option<Duration>,
    ) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl,
            level,
        });
    }

    fn set_selected(&mut self, idx: usize) {
        if idx != self.selected {
            self.selected = idx;
            self.scroll_back = 0;
            self.input_mode = InputMode::Normal;
        }
    }
}

/// Formats an uptime as `45s`, `3m 12s`, or `1h 5m`.
pub fn format_uptime(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

// Bytes a terminal would send for the key.
fn key_bytes(key: KeyEvent) -> Option<Vec<u8>> {
    let bytes = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            vec![control_byte(c)?]
        }
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        KeyCode::Enter => b"\n".to_vec(),
        KeyCode::Tab => b"\t".to_vec(),
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        _ => return None,
    };
    Some(bytes)
}

fn control_byte(c: char) -> Option<u8> {
    if !c.is_ascii_alphabetic() {
        return None;
    }
    let upper = c.to_ascii_uppercase() as u8;
    Some(upper.saturating_sub(b'@'))
}
