//! Build tool abstraction and the synchronous build step.
//!
//! A [`BuildTool`] knows its marker manifest, how to invoke itself for a list
//! of goals, how to read the artifact coordinates back out of the manifest,
//! and where its artifact lands. [`run_build`] executes the build to
//! completion with stdout and stderr merged into one sink.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};

use crate::core::artifact::{ArtifactCoordinates, ArtifactLayout};
use crate::core::types::LaunchCommand;
use crate::io::pom::{POM_FILE, load_pom};
use crate::io::process::pump_lines;
use crate::io::sink::OutputSink;

/// A build-tool family the runner can drive.
pub trait BuildTool: Send + Sync {
    /// Short human-readable name, e.g. `maven`.
    fn name(&self) -> &str;

    /// Manifest file whose presence at the project root marks a project as
    /// belonging to this family.
    fn manifest_file(&self) -> &str;

    /// Command that runs `goals` against the project at `project_root`.
    fn build_command(&self, project_root: &Path, goals: &[String]) -> LaunchCommand;

    /// Read the artifact identifier and version from the project manifest.
    fn read_metadata(&self, project_root: &Path) -> Result<ArtifactCoordinates>;

    fn layout(&self) -> ArtifactLayout;
}

/// Maven, invoked as an external `mvn` process.
#[derive(Debug, Clone)]
pub struct MavenBuild {
    command: LaunchCommand,
}

impl MavenBuild {
    /// `mvn -B` from `PATH`.
    pub fn new() -> Self {
        Self::with_command(LaunchCommand::new("mvn").arg("-B"))
    }

    /// Use a custom Maven launcher (e.g. a wrapper script or an absolute path).
    pub fn with_command(command: LaunchCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &LaunchCommand {
        &self.command
    }
}

impl Default for MavenBuild {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildTool for MavenBuild {
    fn name(&self) -> &str {
        "maven"
    }

    fn manifest_file(&self) -> &str {
        POM_FILE
    }

    fn build_command(&self, project_root: &Path, goals: &[String]) -> LaunchCommand {
        self.command
            .clone()
            .arg("-f")
            .arg(project_root.join(POM_FILE))
            .args(goals)
    }

    fn read_metadata(&self, project_root: &Path) -> Result<ArtifactCoordinates> {
        Ok(load_pom(&project_root.join(POM_FILE))?.coordinates())
    }

    fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::maven()
    }
}

/// How a completed build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Passed,
    Failed { exit_code: Option<i32> },
}

impl BuildOutcome {
    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Self::Passed
        } else {
            Self::Failed {
                exit_code: status.code(),
            }
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Why the build failed, if it did.
    pub fn failure_cause(&self) -> Option<anyhow::Error> {
        match self {
            Self::Passed => None,
            Self::Failed {
                exit_code: Some(code),
            } => Some(anyhow!("build exited with code {code}")),
            Self::Failed { exit_code: None } => Some(anyhow!("build was terminated by a signal")),
        }
    }
}

/// Run a build command to completion, streaming stdout and stderr line by
/// line into `sink`.
///
/// Blocks for the full build duration; there is no timeout. `Err` means the
/// build could not be run at all, a nonzero exit is reported as
/// [`BuildOutcome::Failed`].
#[instrument(skip_all, fields(workdir = %workdir.display()))]
pub fn run_build(mut cmd: Command, workdir: &Path, sink: &dyn OutputSink) -> Result<BuildOutcome> {
    cmd.current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning build process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn build");
            return Err(e).context("spawn build command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let status = thread::scope(|scope| -> Result<ExitStatus> {
        let out = scope.spawn(|| pump_lines(stdout, |line| sink.consume_line(line)));
        let err = scope.spawn(|| pump_lines(stderr, |line| sink.consume_line(line)));
        let status = child.wait().context("wait for build")?;
        for (stream, reader) in [("stdout", out), ("stderr", err)] {
            match reader.join() {
                Ok(Ok(lines)) => debug!(stream, lines, "build output drained"),
                Ok(Err(e)) => warn!(stream, err = %e, "failed to read build output"),
                Err(_) => warn!(stream, "build output reader panicked"),
            }
        }
        Ok(status)
    })?;

    let outcome = BuildOutcome::from_status(status);
    info!(exit_code = ?status.code(), passed = outcome.passed(), "build finished");
    Ok(outcome)
}
