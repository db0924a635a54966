//! Startup waiters: how a caller learns that a launched application is ready.
//!
//! The supervisor knows nothing about readiness. It hands the waiter a
//! [`StartupProbe`] describing the live process and blocks on
//! [`StartupWaiter::block_until_ready`]. Waiters should return early once the
//! process has exited; the supervisor turns that into an "exited too soon"
//! failure.

use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use crate::error::BoxError;
use crate::io::process::ProcessHandle;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for startup")]
    TimedOut(Duration),
    #[error("startup check failed")]
    Failed(#[source] BoxError),
}

/// Caller-supplied readiness policy.
pub trait StartupWaiter: Send + Sync {
    fn block_until_ready(&self, probe: &StartupProbe) -> Result<(), WaitError>;
}

/// Treats the application as ready as soon as it has been spawned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl StartupWaiter for Immediate {
    fn block_until_ready(&self, _probe: &StartupProbe) -> Result<(), WaitError> {
        Ok(())
    }
}

/// Waits until a console line matches `pattern`, the process exits, or
/// `timeout` passes.
#[derive(Debug, Clone)]
pub struct OutputPatternWaiter {
    pattern: Regex,
    timeout: Duration,
    poll_interval: Duration,
}

impl OutputPatternWaiter {
    pub fn new(pattern: Regex, timeout: Duration) -> Self {
        Self {
            pattern,
            timeout,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl StartupWaiter for OutputPatternWaiter {
    fn block_until_ready(&self, probe: &StartupProbe) -> Result<(), WaitError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if probe.any_output_line(|line| self.pattern.is_match(line)) {
                debug!(pid = probe.pid(), pattern = %self.pattern, "ready line seen");
                return Ok(());
            }
            if probe.has_exited() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(WaitError::TimedOut(self.timeout));
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// What a waiter may observe about the process being started.
pub struct StartupProbe {
    process: ProcessHandle,
    tap: Arc<OutputTap>,
}

impl StartupProbe {
    pub(crate) fn new(process: ProcessHandle, tap: Arc<OutputTap>) -> Self {
        Self { process, tap }
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub fn has_exited(&self) -> bool {
        self.process.has_exited()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.process.exit_status()
    }

    /// True if any console line seen so far during startup satisfies `pred`.
    pub fn any_output_line(&self, pred: impl FnMut(&str) -> bool) -> bool {
        self.tap.any(pred)
    }
}

/// Bounded buffer of console lines, open only while a waiter is running.
#[derive(Debug)]
pub(crate) struct OutputTap {
    capacity: usize,
    lines: Mutex<Option<VecDeque<String>>>,
}

impl OutputTap {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(Some(VecDeque::new())),
        }
    }

    pub(crate) fn record(&self, line: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(buf) = lines.as_mut() {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(line.to_string());
        }
    }

    /// Stop buffering and free what was collected.
    pub(crate) fn close(&self) {
        *self.lines.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn any(&self, mut pred: impl FnMut(&str) -> bool) -> bool {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines
            .as_ref()
            .is_some_and(|buf| buf.iter().any(|line| pred(line.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_drops_oldest_lines_beyond_capacity() {
        let tap = OutputTap::new(2);
        tap.record("one");
        tap.record("two");
        tap.record("three");
        assert!(!tap.any(|line| line == "one"));
        assert!(tap.any(|line| line == "three"));
    }

    #[test]
    fn closed_tap_ignores_lines() {
        let tap = OutputTap::new(10);
        tap.record("before");
        tap.close();
        tap.record("after");
        assert!(!tap.any(|_| true));
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::process::Command;

        fn sleeping_probe() -> (StartupProbe, Arc<OutputTap>) {
            let child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
            let handle = ProcessHandle::new(child, "sleep 30".to_string());
            handle.spawn_watcher().expect("watcher");
            let tap = Arc::new(OutputTap::new(100));
            (StartupProbe::new(handle, tap.clone()), tap)
        }

        #[test]
        fn pattern_waiter_returns_once_line_matches() {
            let (probe, tap) = sleeping_probe();
            tap.record("Tomcat started on port 8080");
            let waiter = OutputPatternWaiter::new(
                Regex::new(r"started on port \d+").expect("regex"),
                Duration::from_secs(5),
            );

            waiter.block_until_ready(&probe).expect("ready");
            probe.process.destroy();
        }

        #[test]
        fn pattern_waiter_times_out() {
            let (probe, _tap) = sleeping_probe();
            let waiter = OutputPatternWaiter::new(
                Regex::new("never printed").expect("regex"),
                Duration::from_millis(200),
            )
            .with_poll_interval(Duration::from_millis(10));

            let err = waiter.block_until_ready(&probe).unwrap_err();
            assert!(matches!(err, WaitError::TimedOut(_)));
            probe.process.destroy();
        }

        #[test]
        fn pattern_waiter_stops_when_process_exits() {
            let (probe, _tap) = sleeping_probe();
            probe.process.destroy();
            let waiter = OutputPatternWaiter::new(
                Regex::new("never printed").expect("regex"),
                Duration::from_secs(30),
            );

            waiter.block_until_ready(&probe).expect("returns on exit");
            assert!(probe.has_exited());
        }
    }
}
