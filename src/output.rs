//! Output buffering for dev-server logs.
//!
//! This module provides the bounded per-process line buffer (`LogBuffer`) that
//! the output pumps append to, and the text sanitization used when rendering it.

use std::collections::VecDeque;

use strip_ansi_escapes::strip;

/// Default number of lines kept per dev server.
pub const DEFAULT_MAX_LINES: usize = 100;

/// Line appended when a dev server's process has terminated.
pub const STOPPED_SENTINEL: &str = "--- server stopped ---";

/// Indicates the source stream of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
    /// Emitted by the supervisor itself (e.g. the stop sentinel).
    Supervisor,
}

/// A single line of log output from a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// The content of the log line.
    pub text: String,
    /// The stream it originated from.
    pub stream: StreamKind,
}

impl LogLine {
    pub fn new(text: impl Into<String>, stream: StreamKind) -> Self {
        Self {
            text: text.into(),
            stream,
        }
    }
}

/// A fixed-capacity ring buffer for storing `LogLine`s.
///
/// Not synchronized on its own; `ManagedProcess` keeps it behind a mutex.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    /// Creates a new `LogBuffer` with the specified maximum capacity.
    pub fn new(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: LogLine) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    /// Returns the number of lines currently in the buffer.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns an iterator over the lines in the buffer, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    /// Copies the current line texts out of the buffer.
    #[cfg(test)]
    pub fn texts(&self) -> Vec<String> {
        self.lines.iter().map(|line| line.text.clone()).collect()
    }
}

/// Sanitizes text for display, optionally stripping ANSI escape codes.
///
/// If `strip_ansi` is true, ANSI codes are removed. Invalid UTF-8 sequences are replaced.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}
