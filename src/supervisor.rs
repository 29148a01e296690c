//! Dev-server supervision.
//!
//! This module contains the `Supervisor`, which launches `theme dev` servers for
//! stores, tracks them by store name, and tears them down. Each launch spawns two
//! output pumps (stdout, stderr) and one exit watcher as Tokio tasks. Registry
//! state lives behind a single reader/writer lock; per-process log buffers have
//! their own locks.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{CommandTemplate, Placeholders};
use crate::error::{SupervisorError, SupervisorResult};
use crate::output::{LogLine, StreamKind, DEFAULT_MAX_LINES, STOPPED_SENTINEL};
use crate::ports::{PortTable, DEFAULT_BASE_PORT};
use crate::process::ManagedProcess;
use crate::store::StoreRef;

/// How long the exit watcher waits for the pumps to drain after the child exits.
const PUMP_DRAIN: Duration = Duration::from_millis(250);
/// How long `shutdown` waits for force-killed children to be reaped.
const KILL_WAIT: Duration = Duration::from_millis(500);
const EXIT_POLL: Duration = Duration::from_millis(25);

/// Settings injected into a `Supervisor`.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Command launched per store; `{store}` and `{port}` are substituted.
    pub dev_command: CommandTemplate,
    /// First port handed out.
    pub base_port: u16,
    /// Log lines kept per server.
    pub max_log_lines: usize,
    /// Time between the graceful stop signal and a forced kill. Zero disables
    /// escalation after `stop`; `shutdown` still kills survivors right away.
    pub stop_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            dev_command: CommandTemplate::default_dev(),
            base_port: DEFAULT_BASE_PORT,
            max_log_lines: DEFAULT_MAX_LINES,
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Tracks dev servers by store name.
///
/// Cloning is cheap and shares the same registry.
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: SupervisorConfig,
    registry: RwLock<Registry>,
}

#[derive(Debug)]
struct Registry {
    processes: HashMap<String, Arc<ManagedProcess>>,
    ports: PortTable,
    next_id: u64,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let registry = Registry {
            processes: HashMap::new(),
            ports: PortTable::new(config.base_port),
            next_id: 1,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                registry: RwLock::new(registry),
            }),
        }
    }

    /// Launches a dev server for `store` on the next free port.
    ///
    /// Must be called from within a Tokio runtime. Returns without waiting for
    /// the child to produce output. Fails with `AlreadyRunning` if the store
    /// already has a live server; nothing is registered on any failure.
    pub fn start(&self, store: &StoreRef) -> SupervisorResult<Arc<ManagedProcess>> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SupervisorError::NoRuntime)?;

        let mut registry = self.inner.write();
        if let Some(existing) = registry.processes.get(&store.name) {
            if existing.is_live() {
                return Err(SupervisorError::AlreadyRunning {
                    store: store.name.clone(),
                });
            }
        }

        let port = registry.ports.next_free();
        let values = Placeholders {
            store: Some(store),
            port: Some(port),
        };
        let mut command = self.inner.config.dev_command.to_command(values);
        if let Some(path) = &store.path {
            command.current_dir(path);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        // Own process group, so a stop reaches the CLI's node children too.
        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            store: store.name.clone(),
            source,
        })?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            (stdin, stdout, _) => {
                let stream = if stdin.is_none() {
                    "stdin"
                } else if stdout.is_none() {
                    "stdout"
                } else {
                    "stderr"
                };
                let _ = child.start_kill();
                return Err(SupervisorError::StreamSetup {
                    store: store.name.clone(),
                    stream,
                });
            }
        };

        let id = registry.next_id;
        registry.next_id += 1;
        let pid = child.id();
        let process = Arc::new(ManagedProcess::new(
            id,
            store.clone(),
            port,
            pid,
            Some(stdin),
            self.inner.config.max_log_lines,
        ));
        registry
            .processes
            .insert(store.name.clone(), process.clone());
        registry.ports.reserve(port);

        let pumps = vec![
            runtime.spawn(pump_lines(process.clone(), StreamKind::Stdout, stdout)),
            runtime.spawn(pump_lines(process.clone(), StreamKind::Stderr, stderr)),
        ];
        runtime.spawn(watch_exit(self.inner.clone(), process.clone(), child, pumps));

        info!(
            store = %store.name,
            port,
            pid = pid.unwrap_or(0),
            command = %self.inner.config.dev_command.display(values),
            "dev server started"
        );
        Ok(process)
    }

    /// Sends a termination signal to the store's dev server.
    ///
    /// On success the entry is marked stopped and its port released right away;
    /// the exit watcher confirms the actual exit later. If the signal cannot be
    /// delivered the entry is left untouched.
    pub fn stop(&self, name: &str) -> SupervisorResult<()> {
        let process = {
            let mut registry = self.inner.write();
            let Some(process) = registry.processes.get(name).cloned() else {
                return Err(SupervisorError::NotFound {
                    store: name.to_string(),
                });
            };
            if !process.is_live() {
                return Err(SupervisorError::AlreadyStopped {
                    store: name.to_string(),
                });
            }
            // Once reaped, the pid may belong to someone else.
            if let Some(pid) = process.pid().filter(|_| !process.has_exited()) {
                terminate(pid).map_err(|source| {
                    warn!(store = %name, pid, error = %source, "failed to signal dev server");
                    SupervisorError::Signal {
                        store: name.to_string(),
                        source,
                    }
                })?;
            }
            if process.mark_stopped() {
                registry.ports.release(process.port());
            }
            process
        };
        info!(store = %name, port = process.port(), "dev server stopped");
        self.escalate_later(process);
        Ok(())
    }

    /// Signals every live server and clears all port reservations. Never fails.
    pub fn stop_all(&self) {
        let stopped: Vec<Arc<ManagedProcess>> = {
            let mut registry = self.inner.write();
            let mut stopped = Vec::new();
            for process in registry.processes.values() {
                if !process.is_live() {
                    continue;
                }
                if let Some(pid) = process.pid().filter(|_| !process.has_exited()) {
                    if let Err(err) = terminate(pid) {
                        warn!(store = %process.name(), pid, error = %err, "failed to signal dev server");
                    }
                }
                process.mark_stopped();
                stopped.push(process.clone());
            }
            registry.ports.clear();
            stopped
        };
        info!(count = stopped.len(), "stopped all dev servers");
        for process in stopped {
            self.escalate_later(process);
        }
    }

    /// Stops everything and waits for the children to be reaped, force-killing
    /// any that outlive the stop grace period. With a zero grace the survivors
    /// are killed at once.
    pub async fn shutdown(&self) {
        self.stop_all();
        let pending = self.unreaped();
        if pending.is_empty() {
            return;
        }
        let grace = self.inner.config.stop_grace;
        if !wait_for_exits(&pending, grace).await {
            for process in pending.iter().filter(|p| !p.has_exited()) {
                warn!(store = %process.name(), "dev server ignored stop signal, killing");
                process.request_kill();
            }
            wait_for_exits(&pending, KILL_WAIT).await;
        }
    }

    /// Live servers, ordered by store name.
    pub fn list_active(&self) -> Vec<Arc<ManagedProcess>> {
        let registry = self.inner.read();
        let mut active: Vec<_> = registry
            .processes
            .values()
            .filter(|process| process.is_live())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name().cmp(b.name()));
        active
    }

    pub fn count_active(&self) -> usize {
        self.inner
            .read()
            .processes
            .values()
            .filter(|process| process.is_live())
            .count()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.inner
            .read()
            .processes
            .get(name)
            .map(|process| process.is_live())
            .unwrap_or(false)
    }

    /// The live server for a store, if any.
    pub fn get(&self, name: &str) -> Option<Arc<ManagedProcess>> {
        self.inner
            .read()
            .processes
            .get(name)
            .filter(|process| process.is_live())
            .cloned()
    }

    /// The latest entry for a store, live or not. Lets a log view keep showing
    /// output after the server went down.
    pub fn last(&self, name: &str) -> Option<Arc<ManagedProcess>> {
        self.inner.read().processes.get(name).cloned()
    }

    /// Ports currently reserved, ascending.
    #[cfg(test)]
    pub fn reserved_ports(&self) -> Vec<u16> {
        let registry = self.inner.read();
        let mut ports: Vec<u16> = registry
            .processes
            .values()
            .map(|process| process.port())
            .filter(|port| registry.ports.is_reserved(*port))
            .collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    fn unreaped(&self) -> Vec<Arc<ManagedProcess>> {
        self.inner
            .read()
            .processes
            .values()
            .filter(|process| !process.has_exited())
            .cloned()
            .collect()
    }

    fn escalate_later(&self, process: Arc<ManagedProcess>) {
        let grace = self.inner.config.stop_grace;
        if grace.is_zero() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if !process.has_exited() {
                warn!(store = %process.name(), "dev server still running after stop, killing");
                process.request_kill();
            }
        });
    }
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Records a child's termination. Only the instance still registered under
    // its store name is touched, and its port is released only if it was live.
    fn on_exit(&self, process: &Arc<ManagedProcess>, status: std::io::Result<ExitStatus>) {
        let mut registry = self.write();
        let current = registry
            .processes
            .get(process.name())
            .is_some_and(|entry| Arc::ptr_eq(entry, process));
        if !current {
            debug!(store = %process.name(), id = process.id(), "exit of replaced dev server ignored");
            return;
        }
        if process.mark_stopped() {
            registry.ports.release(process.port());
        }
        process.append_log(LogLine::new(STOPPED_SENTINEL, StreamKind::Supervisor));
        match status {
            Ok(status) => info!(
                store = %process.name(),
                code = status.code().unwrap_or(-1),
                "dev server exited"
            ),
            Err(err) => warn!(store = %process.name(), error = %err, "failed to wait on dev server"),
        }
    }
}

// Drains one output stream into the process's log until EOF or a read error.
async fn pump_lines<R>(process: Arc<ManagedProcess>, stream: StreamKind, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let text = String::from_utf8_lossy(&buf).into_owned();
                process.append_log(LogLine::new(text, stream));
            }
        }
    }
}

async fn watch_exit(
    inner: Arc<Inner>,
    process: Arc<ManagedProcess>,
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = process.kill_requested() => {
                if let Some(pid) = child.id() {
                    kill_group(pid);
                }
                if let Err(err) = child.start_kill() {
                    warn!(store = %process.name(), error = %err, "failed to kill dev server");
                }
            }
        }
    };
    process.mark_exited();
    process.close_input().await;
    // Grandchildren may hold the pipes open; don't wait on them forever.
    let _ = tokio::time::timeout(PUMP_DRAIN, async {
        for pump in pumps {
            let _ = pump.await;
        }
    })
    .await;
    inner.on_exit(&process, status);
}

async fn wait_for_exits(processes: &[Arc<ManagedProcess>], timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if processes.iter().all(|process| process.has_exited()) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL).await;
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> std::io::Result<()> {
    let pid = pid as libc::pid_t;
    let group = unsafe { libc::kill(-pid, libc::SIGTERM) };
    let direct = unsafe { libc::kill(pid, libc::SIGTERM) };
    if group == 0 || direct == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

// Escalation must reach the same group the stop signal did.
#[cfg(unix)]
fn kill_group(pid: u32) {
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

// Windows has no SIGTERM; CTRL_BREAK to the child's process group is the closest.
#[cfg(windows)]
fn terminate(pid: u32) -> std::io::Result<()> {
    use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
    let ok = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
    if ok != 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(any(unix, windows)))]
fn terminate(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "signals are not supported on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::store::DownloadMethod;

    const LONG_RUNNING: &str = "sh -c 'echo listening on {port}; while read line; do echo got:$line; done'";

    fn supervisor(command: &str) -> Supervisor {
        Supervisor::new(SupervisorConfig {
            dev_command: CommandTemplate::parse(command).unwrap(),
            stop_grace: Duration::from_millis(500),
            ..SupervisorConfig::default()
        })
    }

    fn store(name: &str) -> StoreRef {
        StoreRef::new(name, format!("{}.myshopify.com", name.to_lowercase()), DownloadMethod::Pull)
            .with_path(std::env::temp_dir())
    }

    // Reparented zombies count as gone.
    fn pid_alive(pid: i32) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    fn read_pid(path: &std::path::Path) -> i32 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check()
    }

    #[tokio::test]
    async fn first_start_gets_base_port() {
        let supervisor = supervisor(LONG_RUNNING);
        let process = supervisor.start(&store("Shop A")).unwrap();
        assert_eq!(process.port(), 9292);
        assert_eq!(process.url(), "http://127.0.0.1:9292");
        assert!(supervisor.is_active("Shop A"));
        assert_eq!(supervisor.count_active(), 1);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn second_store_gets_next_port() {
        let supervisor = supervisor(LONG_RUNNING);
        let a = supervisor.start(&store("Shop A")).unwrap();
        let b = supervisor.start(&store("Shop B")).unwrap();
        assert_eq!(a.port(), 9292);
        assert_eq!(b.port(), 9293);
        let names: Vec<_> = supervisor
            .list_active()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["Shop A", "Shop B"]);
        assert_eq!(supervisor.reserved_ports(), vec![9292, 9293]);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn starting_a_live_store_is_rejected() {
        let supervisor = supervisor(LONG_RUNNING);
        let first = supervisor.start(&store("Shop A")).unwrap();
        let err = supervisor.start(&store("Shop A")).unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));
        let current = supervisor.get("Shop A").unwrap();
        assert_eq!(current.id(), first.id());
        assert_eq!(current.port(), 9292);
        assert_eq!(supervisor.count_active(), 1);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn stop_then_restart_reuses_port() {
        let supervisor = supervisor(LONG_RUNNING);
        let first = supervisor.start(&store("Shop A")).unwrap();
        supervisor.stop("Shop A").unwrap();
        assert!(!supervisor.is_active("Shop A"));
        assert!(supervisor.get("Shop A").is_none());
        assert!(supervisor.reserved_ports().is_empty());

        let second = supervisor.start(&store("Shop A")).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(second.port(), 9292);

        // The first instance's exit must not disturb the second.
        assert!(wait_until(Duration::from_secs(5), || first.has_exited()).await);
        tokio::time::sleep(PUMP_DRAIN * 2).await;
        assert!(supervisor.is_active("Shop A"));
        assert_eq!(supervisor.reserved_ports(), vec![9292]);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn second_stop_reports_already_stopped() {
        let supervisor = supervisor(LONG_RUNNING);
        supervisor.start(&store("Shop A")).unwrap();
        supervisor.start(&store("Shop B")).unwrap();
        supervisor.stop("Shop A").unwrap();
        let err = supervisor.stop("Shop A").unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyStopped { .. }));
        assert_eq!(supervisor.reserved_ports(), vec![9293]);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn stop_unknown_store_is_not_found() {
        let supervisor = supervisor(LONG_RUNNING);
        let err = supervisor.stop("Nope").unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn output_is_captured_and_input_forwarded() {
        let supervisor = supervisor(LONG_RUNNING);
        let process = supervisor.start(&store("Shop A")).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || {
                process.read_logs().iter().any(|l| l == "listening on 9292")
            })
            .await
        );
        process.send_input(b"hello\n").await.unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || {
                process.read_logs().iter().any(|l| l == "got:hello")
            })
            .await
        );
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn stderr_is_captured() {
        let supervisor = supervisor("sh -c 'echo oops >&2; sleep 30'");
        let process = supervisor.start(&store("Shop A")).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || {
                process
                    .read_log_lines()
                    .iter()
                    .any(|l| l.text == "oops" && l.stream == StreamKind::Stderr)
            })
            .await
        );
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn spontaneous_exit_converges() {
        let supervisor = supervisor("sh -c 'echo bye'");
        let process = supervisor.start(&store("Shop A")).unwrap();
        assert!(wait_until(Duration::from_secs(5), || !supervisor.is_active("Shop A")).await);
        assert!(
            wait_until(Duration::from_secs(1), || {
                process.read_logs().last().map(String::as_str) == Some(STOPPED_SENTINEL)
            })
            .await
        );
        let sentinels = process
            .read_logs()
            .iter()
            .filter(|l| l.as_str() == STOPPED_SENTINEL)
            .count();
        assert_eq!(sentinels, 1);
        assert!(supervisor.reserved_ports().is_empty());
        let err = supervisor.stop("Shop A").unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyStopped { .. }));
        let err = process.send_input(b"q").await.unwrap_err();
        assert!(matches!(err, SupervisorError::InputUnavailable { .. }));

        let again = supervisor.start(&store("Shop A")).unwrap();
        assert_ne!(again.id(), process.id());
        assert_eq!(again.port(), 9292);
        assert!(wait_until(Duration::from_secs(5), || again.has_exited()).await);
    }

    #[tokio::test]
    async fn undeliverable_stop_leaves_server_registered() {
        let supervisor = supervisor(LONG_RUNNING);
        // No process or group has this id, so both signals fail.
        let unreachable = ManagedProcess::new(1, store("Shop A"), 9292, Some(i32::MAX as u32), None, 10);
        {
            let mut registry = supervisor.inner.write();
            registry
                .processes
                .insert("Shop A".to_string(), Arc::new(unreachable));
            registry.ports.reserve(9292);
        }
        let err = supervisor.stop("Shop A").unwrap_err();
        assert!(matches!(err, SupervisorError::Signal { .. }));
        assert!(supervisor.is_active("Shop A"));
        assert_eq!(supervisor.reserved_ports(), vec![9292]);
        let next = supervisor.start(&store("Shop B")).unwrap();
        assert_eq!(next.port(), 9293);
        supervisor.stop("Shop B").unwrap();
    }

    #[tokio::test]
    async fn exited_server_is_not_signalled_again() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(SupervisorConfig {
            dev_command: CommandTemplate::parse("sh -c 'sleep 5 & echo $! > sleeper.pid; echo bye'").unwrap(),
            stop_grace: Duration::ZERO,
            ..SupervisorConfig::default()
        });
        let shop = store("Shop A").with_path(dir.path());
        let process = supervisor.start(&shop).unwrap();
        // The sleeper keeps stdout open, so the entry stays live while the pumps drain.
        assert!(wait_until(Duration::from_secs(5), || process.has_exited()).await);
        match supervisor.stop("Shop A") {
            Ok(()) | Err(SupervisorError::AlreadyStopped { .. }) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let sleeper = read_pid(&dir.path().join("sleeper.pid"));
        assert!(pid_alive(sleeper));
        unsafe {
            libc::kill(sleeper, libc::SIGKILL);
        }
    }

    #[tokio::test]
    async fn stop_all_clears_everything() {
        let supervisor = supervisor(LONG_RUNNING);
        let a = supervisor.start(&store("Shop A")).unwrap();
        let b = supervisor.start(&store("Shop B")).unwrap();
        supervisor.stop_all();
        assert_eq!(supervisor.count_active(), 0);
        assert!(supervisor.reserved_ports().is_empty());
        assert!(wait_until(Duration::from_secs(5), || a.has_exited() && b.has_exited()).await);
    }

    #[tokio::test]
    async fn ignored_signal_is_escalated() {
        let supervisor = Supervisor::new(SupervisorConfig {
            dev_command: CommandTemplate::parse("sh -c 'trap \"\" TERM; echo armed; while true; do sleep 1; done'")
                .unwrap(),
            stop_grace: Duration::from_millis(200),
            ..SupervisorConfig::default()
        });
        let process = supervisor.start(&store("Shop A")).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || {
                process.read_logs().iter().any(|l| l == "armed")
            })
            .await
        );
        supervisor.stop("Shop A").unwrap();
        assert!(wait_until(Duration::from_secs(5), || process.has_exited()).await);
    }

    #[tokio::test]
    async fn forced_kill_reaches_the_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("serve.sh"),
            "trap '' TERM\n(while :; do sleep 1; done) &\necho $! > helper.pid\necho armed\nwhile :; do sleep 1; done\n",
        )
        .unwrap();
        let supervisor = Supervisor::new(SupervisorConfig {
            dev_command: CommandTemplate::parse("sh serve.sh").unwrap(),
            stop_grace: Duration::from_millis(200),
            ..SupervisorConfig::default()
        });
        let process = supervisor
            .start(&store("Shop A").with_path(dir.path()))
            .unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || {
                process.read_logs().iter().any(|l| l == "armed")
            })
            .await
        );
        let helper = read_pid(&dir.path().join("helper.pid"));
        supervisor.stop("Shop A").unwrap();
        assert!(wait_until(Duration::from_secs(5), || process.has_exited()).await);
        assert!(wait_until(Duration::from_secs(5), || !pid_alive(helper)).await);
    }

    #[tokio::test]
    async fn shutdown_with_zero_grace_kills_survivors() {
        let supervisor = Supervisor::new(SupervisorConfig {
            dev_command: CommandTemplate::parse("sh -c 'trap \"\" TERM; echo armed; while true; do sleep 1; done'")
                .unwrap(),
            stop_grace: Duration::ZERO,
            ..SupervisorConfig::default()
        });
        let process = supervisor.start(&store("Shop A")).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || {
                process.read_logs().iter().any(|l| l == "armed")
            })
            .await
        );
        supervisor.shutdown().await;
        assert!(wait_until(Duration::from_secs(5), || process.has_exited()).await);
    }

    #[tokio::test]
    async fn missing_program_fails_without_registering() {
        let supervisor = supervisor("definitely-not-a-real-program-xyz");
        let err = supervisor.start(&store("Shop A")).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(supervisor.last("Shop A").is_none());
        assert!(supervisor.reserved_ports().is_empty());
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let supervisor = supervisor(LONG_RUNNING);
        let err = supervisor.start(&store("Shop A")).unwrap_err();
        assert!(matches!(err, SupervisorError::NoRuntime));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_get_unique_ports() {
        let supervisor = supervisor(LONG_RUNNING);
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let supervisor = supervisor.clone();
                tokio::spawn(async move { supervisor.start(&store(&format!("Shop {i}"))) })
            })
            .collect();
        let mut ports = Vec::new();
        for handle in handles {
            ports.push(handle.await.unwrap().unwrap().port());
        }
        ports.sort_unstable();
        assert_eq!(ports, (9292..9298).collect::<Vec<_>>());
        supervisor.shutdown().await;
    }
}
