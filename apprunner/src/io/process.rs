//! Background process supervision.
//!
//! [`start_daemon`] launches a long-lived child, pumps its stdout/stderr into a
//! console sink on dedicated threads, lets a [`StartupWaiter`] decide when the
//! application is up, and hands back a [`ProcessHandle`] that can destroy the
//! process later. A separate watcher thread records the exit status so that
//! readiness checks and [`ProcessHandle::wait`] observe natural exits.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::LaunchCommand;
use crate::error::ProjectCannotStart;
use crate::io::sink::{OutputSink, SharedSink};
use crate::io::waiter::{OutputTap, StartupProbe, StartupWaiter, WaitError};

/// How often the watcher thread polls the child for exit.
const WATCH_INTERVAL: Duration = Duration::from_millis(50);
/// How long `destroy` waits for a killed child to be reaped.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(10);
/// Console lines kept for startup waiters; older lines are dropped.
const STARTUP_TAP_LINES: usize = 1_000;

/// Start `command` in `workdir` as a supervised background process.
///
/// `env` is added on top of the inherited environment. Every line the child
/// writes to stdout or stderr goes to `console_log` for as long as it runs.
/// Launch failures are also written to `build_log`, which doubles as the log
/// for the launch step.
///
/// Returns only once `waiter` reports the application as ready. If the waiter
/// times out or fails, the process is destroyed before the error is returned,
/// so a failed start never leaves a child behind.
#[instrument(skip_all, fields(workdir = %workdir.display(), command = %command))]
pub fn start_daemon(
    build_log: &dyn OutputSink,
    console_log: SharedSink,
    env: &HashMap<String, String>,
    command: &LaunchCommand,
    workdir: &Path,
    waiter: &dyn StartupWaiter,
) -> Result<ProcessHandle, ProjectCannotStart> {
    let started = Instant::now();
    info!("starting process");

    let mut cmd = command.to_command();
    cmd.current_dir(workdir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let error_on_start = || {
        format!(
            "Built successfully, but error on start for {}",
            workdir.display()
        )
    };

    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn process");
            return Err(report(
                build_log,
                ProjectCannotStart::with_cause(error_on_start(), e),
            ));
        }
    };

    let tap = Arc::new(OutputTap::new(STARTUP_TAP_LINES));
    let handle = match supervise(child, command, console_log, tap.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            error!(err = %e, "failed to supervise process");
            return Err(report(
                build_log,
                ProjectCannotStart::with_cause(error_on_start(), e),
            ));
        }
    };

    let probe = StartupProbe::new(handle.clone(), tap.clone());
    let readiness = waiter.block_until_ready(&probe);
    tap.close();

    match readiness {
        Ok(()) if handle.has_exited() => {
            warn!(status = ?handle.exit_status(), "process exited during startup");
            return Err(report(
                build_log,
                ProjectCannotStart::new(format!(
                    "The project at {} started but exited all too soon. \
                     Check the console log for information.",
                    workdir.display()
                )),
            ));
        }
        Ok(()) => {}
        Err(WaitError::TimedOut(after)) => {
            warn!(timeout_ms = after.as_millis() as u64, "startup timed out, destroying");
            handle.destroy();
            return Err(report(
                build_log,
                ProjectCannotStart::new(format!(
                    "Built successfully, but timed out waiting for startup at {}",
                    workdir.display()
                )),
            ));
        }
        Err(e @ WaitError::Failed(_)) => {
            warn!(err = %e, "startup check failed, destroying");
            handle.destroy();
            return Err(report(
                build_log,
                ProjectCannotStart::with_cause(error_on_start(), e),
            ));
        }
    }

    info!(
        pid = handle.pid(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "process started"
    );
    Ok(handle)
}

/// Wire output pumps and the exit watcher to a freshly spawned child.
/// On any failure the child is destroyed so it cannot leak.
fn supervise(
    mut child: Child,
    command: &LaunchCommand,
    console_log: SharedSink,
    tap: Arc<OutputTap>,
) -> Result<ProcessHandle> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"));
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"));
    let handle = ProcessHandle::new(child, command.to_string());

    let wired = (|| -> Result<()> {
        spawn_pump("stdout", handle.pid(), stdout?, console_log.clone(), tap.clone())?;
        spawn_pump("stderr", handle.pid(), stderr?, console_log, tap)?;
        handle.spawn_watcher()
    })();

    if let Err(e) = wired {
        handle.destroy();
        return Err(e);
    }
    Ok(handle)
}

fn spawn_pump<R: Read + Send + 'static>(
    stream: &'static str,
    pid: u32,
    reader: R,
    console_log: SharedSink,
    tap: Arc<OutputTap>,
) -> Result<()> {
    thread::Builder::new()
        .name(format!("{stream}-{pid}"))
        .spawn(move || {
            let pumped = pump_lines(reader, |line| {
                tap.record(line);
                console_log.consume_line(line);
            });
            match pumped {
                Ok(lines) => debug!(pid, stream, lines, "output stream closed"),
                Err(e) => warn!(pid, stream, err = %e, "output stream failed"),
            }
        })
        .with_context(|| format!("spawn {stream} reader thread"))?;
    Ok(())
}

/// Read `reader` line by line until EOF, handing each line (without its line
/// terminator) to `on_line`. Invalid UTF-8 is replaced rather than rejected.
pub(crate) fn pump_lines<R: Read>(reader: R, mut on_line: impl FnMut(&str)) -> Result<usize> {
    let mut buf_reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut count = 0usize;

    loop {
        line.clear();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        on_line(text.trim_end_matches(['\n', '\r']));
        count += 1;
    }

    Ok(count)
}

/// Live reference to a supervised child process (the watchdog).
///
/// Cloning is cheap; every clone refers to the same process. Exit status is
/// recorded once, either by the watcher thread or by [`destroy`](Self::destroy).
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Watched>,
}

struct Watched {
    pid: u32,
    label: String,
    child: Mutex<Child>,
    exit: Mutex<Option<ExitStatus>>,
    exited: Condvar,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.inner.pid)
            .field("command", &self.inner.label)
            .field("exit", &self.exit_status())
            .finish()
    }
}

impl ProcessHandle {
    /// Wrap a spawned child. Exit is only observed once
    /// [`spawn_watcher`](Self::spawn_watcher) runs or the handle is destroyed.
    pub(crate) fn new(child: Child, label: String) -> Self {
        Self {
            inner: Arc::new(Watched {
                pid: child.id(),
                label,
                child: Mutex::new(child),
                exit: Mutex::new(None),
                exited: Condvar::new(),
            }),
        }
    }

    /// Start the thread that records the child's exit status.
    pub(crate) fn spawn_watcher(&self) -> Result<()> {
        let handle = self.clone();
        thread::Builder::new()
            .name(format!("watch-{}", self.inner.pid))
            .spawn(move || handle.watch())
            .context("spawn process watcher thread")?;
        Ok(())
    }

    fn watch(&self) {
        while !self.has_exited() {
            let polled = lock(&self.inner.child).try_wait();
            match polled {
                Ok(Some(status)) => {
                    debug!(pid = self.inner.pid, ?status, "process exited");
                    self.record_exit(status);
                }
                Ok(None) => thread::sleep(WATCH_INTERVAL),
                Err(e) => {
                    warn!(pid = self.inner.pid, err = %e, "failed to poll process, stop watching");
                    return;
                }
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// The command line this process was started with.
    pub fn command(&self) -> &str {
        &self.inner.label
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *lock(&self.inner.exit)
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Block until the process exits.
    pub fn wait(&self) -> ExitStatus {
        let exit = self
            .inner
            .exited
            .wait_while(lock(&self.inner.exit), |exit| exit.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        (*exit).unwrap_or_else(|| unreachable!("wait_while returned without an exit status"))
    }

    /// Block until the process exits or `timeout` passes.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitStatus> {
        let (exit, _) = self
            .inner
            .exited
            .wait_timeout_while(lock(&self.inner.exit), timeout, |exit| exit.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *exit
    }

    /// Forcefully terminate the process. Idempotent: destroying a process that
    /// already exited, or was already destroyed, does nothing. Failures are
    /// logged and swallowed.
    pub fn destroy(&self) {
        if self.has_exited() {
            debug!(pid = self.inner.pid, "process already exited");
            return;
        }

        let reaped = {
            let mut child = lock(&self.inner.child);
            match child.try_wait() {
                Ok(Some(status)) => Ok(Some(status)),
                _ => {
                    info!(pid = self.inner.pid, "destroying process");
                    if let Err(e) = child.kill() {
                        warn!(pid = self.inner.pid, err = %e, "failed to kill process");
                    }
                    child.wait_timeout(KILL_REAP_TIMEOUT)
                }
            }
        };

        match reaped {
            Ok(Some(status)) => self.record_exit(status),
            Ok(None) => warn!(
                pid = self.inner.pid,
                timeout_secs = KILL_REAP_TIMEOUT.as_secs(),
                "process still running after kill"
            ),
            Err(e) => warn!(pid = self.inner.pid, err = %e, "failed to reap process"),
        }
    }

    fn record_exit(&self, status: ExitStatus) {
        let mut exit = lock(&self.inner.exit);
        if exit.is_none() {
            *exit = Some(status);
            self.inner.exited.notify_all();
        }
    }
}

/// Echo a launch failure into the build log, then hand it back.
fn report(build_log: &dyn OutputSink, err: ProjectCannotStart) -> ProjectCannotStart {
    build_log.consume_line(err.message());
    if let Some(cause) = err.cause() {
        let mut line = cause.to_string();
        let mut next = cause.source();
        while let Some(inner) = next {
            line.push_str(": ");
            line.push_str(&inner.to_string());
            next = inner.source();
        }
        build_log.consume_line(&line);
    }
    err
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
