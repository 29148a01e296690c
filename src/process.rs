//! State of a single supervised dev server.
//!
//! A `ManagedProcess` is shared (`Arc`) between the supervisor registry, its
//! output pumps and exit watcher, and the UI. Its log buffer has its own lock so
//! that high-frequency appends never contend with registry operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Notify;

use crate::error::{SupervisorError, SupervisorResult};
use crate::output::{LogBuffer, LogLine};
use crate::store::StoreRef;

/// Runtime record of one dev-server instance.
#[derive(Debug)]
pub struct ManagedProcess {
    id: u64,
    store: StoreRef,
    pid: Option<u32>,
    port: u16,
    url: String,
    started_at: Instant,
    live: AtomicBool,
    exited: AtomicBool,
    logs: Mutex<LogBuffer>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    kill: Notify,
}

impl ManagedProcess {
    /// Creates a live process record. The store is snapshotted by value.
    pub(crate) fn new(
        id: u64,
        store: StoreRef,
        port: u16,
        pid: Option<u32>,
        stdin: Option<ChildStdin>,
        max_lines: usize,
    ) -> Self {
        Self {
            id,
            store,
            pid,
            port,
            url: local_url(port),
            started_at: Instant::now(),
            live: AtomicBool::new(true),
            exited: AtomicBool::new(false),
            logs: Mutex::new(LogBuffer::new(max_lines)),
            stdin: tokio::sync::Mutex::new(stdin),
            kill: Notify::new(),
        }
    }

    /// Unique id of this instance within the supervisor.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.store.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Local URL the dev server is reachable at.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Flips liveness to false. Returns `true` only for the call that made the transition.
    ///
    /// Callers hold the registry write lock so the port release that follows
    /// happens exactly once.
    pub(crate) fn mark_stopped(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }

    /// Whether the OS process has been observed to terminate.
    ///
    /// Unlike `is_live`, this stays false after `stop` until the child is reaped.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.store(true, Ordering::Release);
    }

    /// Appends a line, evicting the oldest lines beyond the cap.
    pub fn append_log(&self, line: LogLine) {
        self.lock_logs().push(line);
    }

    /// Snapshot of the current log texts, oldest first.
    #[cfg(test)]
    pub fn read_logs(&self) -> Vec<String> {
        self.lock_logs().texts()
    }

    /// Snapshot of the current log lines with their stream.
    pub fn read_log_lines(&self) -> Vec<LogLine> {
        self.lock_logs().iter().cloned().collect()
    }

    /// Writes raw bytes to the process's standard input.
    pub async fn send_input(&self, bytes: &[u8]) -> SupervisorResult<()> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(SupervisorError::InputUnavailable {
                store: self.store.name.clone(),
            });
        };
        if bytes.is_empty() {
            return Ok(());
        }
        let result = match stdin.write_all(bytes).await {
            Ok(()) => stdin.flush().await,
            Err(err) => Err(err),
        };
        result.map_err(|source| SupervisorError::Input {
            store: self.store.name.clone(),
            source,
        })
    }

    /// Drops the standard-input pipe; later `send_input` calls fail.
    pub(crate) async fn close_input(&self) {
        self.stdin.lock().await.take();
    }

    /// Asks the exit watcher to force-kill the child.
    pub(crate) fn request_kill(&self) {
        self.kill.notify_one();
    }

    pub(crate) async fn kill_requested(&self) {
        self.kill.notified().await;
    }

    fn lock_logs(&self) -> MutexGuard<'_, LogBuffer> {
        self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn local_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}
