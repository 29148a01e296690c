//! Event definitions for the dev-server view's event loop.
//!
//! Terminal input and OS signals are funneled into one channel as `Event`s;
//! supervisor state is polled on each tick rather than pushed through here.

use crossterm::event::{KeyEvent, MouseEvent};

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// A mouse event received from the user.
    Mouse(MouseEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// The application received SIGINT/SIGTERM and should stop every server and exit.
    Shutdown { signal: &'static str },
}
