//! Line sinks for build and console output.
//!
//! Build output and application console output both flow through the same
//! narrow [`OutputSink`] capability, so callers can route them to the same
//! place or to different places without the runner caring.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::warn;

/// Consumes output one line at a time. Lines arrive without their trailing newline.
///
/// Sinks are called from background reader threads and must not block the
/// producer indefinitely.
pub trait OutputSink: Send + Sync {
    fn consume_line(&self, line: &str);
}

/// Sink shared between the caller and the reader threads.
pub type SharedSink = Arc<dyn OutputSink>;

impl<F> OutputSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn consume_line(&self, line: &str) {
        self(line);
    }
}

/// Appends each line to a file and flushes immediately for real-time visibility.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Create (or truncate) the log file, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("create log file {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl OutputSink for FileSink {
    fn consume_line(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{line}") {
            warn!(err = %e, "failed to write to log file");
        } else if let Err(e) = writer.flush() {
            warn!(err = %e, "failed to flush log file");
        }
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line received so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl OutputSink for MemorySink {
    fn consume_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// Forwards every line to each inner sink in order.
#[derive(Default)]
pub struct TeeSink {
    sinks: Vec<SharedSink>,
}

impl TeeSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }
}

impl OutputSink for TeeSink {
    fn consume_line(&self, line: &str) {
        for sink in &self.sinks {
            sink.consume_line(line);
        }
    }
}
