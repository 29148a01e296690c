//! Error types returned by the development-server supervisor.

use thiserror::Error;

/// Failures surfaced by [`crate::supervisor::Supervisor`] and
/// [`crate::process::ManagedProcess`].
///
/// None of these are fatal to the application; the UI renders them as
/// status messages.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A live server already exists for the store.
    #[error("a dev server is already running for '{store}'")]
    AlreadyRunning { store: String },

    /// The registry has no entry for the store.
    #[error("no dev server for '{store}'")]
    NotFound { store: String },

    /// The entry exists but its process is no longer live.
    #[error("the dev server for '{store}' is already stopped")]
    AlreadyStopped { store: String },

    /// One of the standard streams could not be captured.
    #[error("failed to capture {stream} for '{store}'")]
    StreamSetup { store: String, stream: &'static str },

    /// The OS process could not be created.
    #[error("failed to start dev server for '{store}': {source}")]
    Spawn {
        store: String,
        #[source]
        source: std::io::Error,
    },

    /// The termination signal could not be delivered.
    #[error("failed to stop dev server for '{store}': {source}")]
    Signal {
        store: String,
        #[source]
        source: std::io::Error,
    },

    /// The process has no standard input to write to.
    #[error("stdin is not available for '{store}'")]
    InputUnavailable { store: String },

    /// Writing to the process's standard input failed.
    #[error("failed to send input to '{store}': {source}")]
    Input {
        store: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called outside of an async runtime.
    #[error("dev servers can only be started inside the async runtime")]
    NoRuntime,

    /// The dev command template is empty or could not be parsed.
    #[error("invalid dev command: {0}")]
    Command(String),
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
