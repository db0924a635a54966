//! Build-then-launch orchestration for a single project.
//!
//! `start` runs the build, re-reads the manifest, resolves the artifact, builds
//! the launch command and hands it to the supervisor. Each step's failure
//! short-circuits the rest and surfaces as one [`ProjectCannotStart`].
//! `shutdown` destroys whatever process `start` left running.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use crate::error::ProjectCannotStart;
use crate::io::artifact::locate_artifact;
use crate::io::build::{BuildOutcome, BuildTool, run_build};
use crate::io::process::{ProcessHandle, start_daemon};
use crate::io::runtime::RuntimeProvider;
use crate::io::sink::{OutputSink, SharedSink};
use crate::io::waiter::StartupWaiter;

/// Builds and runs one project with one build-tool family.
///
/// `Runner` is `Send + Sync`: `start` may run on one thread while another
/// calls `shutdown`.
pub struct Runner {
    project_root: PathBuf,
    goals: Vec<String>,
    tool: Arc<dyn BuildTool>,
    runtime: Arc<dyn RuntimeProvider>,
    process: Mutex<Option<ProcessHandle>>,
}

impl Runner {
    pub fn new(
        project_root: impl Into<PathBuf>,
        tool: Arc<dyn BuildTool>,
        runtime: Arc<dyn RuntimeProvider>,
        goals: Vec<String>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            goals,
            tool,
            runtime,
            process: Mutex::new(None),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }

    /// Build the project and launch its artifact.
    ///
    /// Blocks for the whole build and until `waiter` reports the application
    /// ready. Build output goes to `build_log`; the application's stdout and
    /// stderr go to `console_log` for as long as it runs. `env` is added to
    /// the application's inherited environment.
    ///
    /// On success exactly one process is running for this runner; on failure
    /// none is started.
    #[instrument(skip_all, fields(project = %self.project_root.display(), tool = self.tool.name()))]
    pub fn start(
        &self,
        build_log: &dyn OutputSink,
        console_log: SharedSink,
        env: &HashMap<String, String>,
        waiter: &dyn StartupWaiter,
    ) -> Result<(), ProjectCannotStart> {
        self.build(build_log)?;
        info!("build successful, going to start app");

        let coords = self.tool.read_metadata(&self.project_root).map_err(|e| {
            ProjectCannotStart::with_cause("Error while reading build metadata", e)
        })?;
        debug!(%coords, "read build metadata");

        let layout = self.tool.layout();
        locate_artifact(&self.project_root, &layout, &coords)?;

        let command = self.runtime.launch_command(&layout.relative_path(&coords));

        // A restart replaces the previous process instead of leaking it.
        if let Some(previous) = self.take_process() {
            info!(pid = previous.pid(), "stopping previous process before relaunch");
            previous.destroy();
        }

        let handle = start_daemon(
            build_log,
            console_log,
            env,
            &command,
            &self.project_root,
            waiter,
        )?;
        *self.process.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn build(&self, build_log: &dyn OutputSink) -> Result<(), ProjectCannotStart> {
        let mut cmd = self
            .tool
            .build_command(&self.project_root, &self.goals)
            .to_command();
        self.runtime.prepare_build(&mut cmd);

        info!(goals = ?self.goals, "building {} project", self.tool.name());
        match run_build(cmd, &self.project_root, build_log) {
            Ok(BuildOutcome::Passed) => Ok(()),
            Ok(outcome) => {
                warn!(?outcome, "build failed");
                let cause = outcome
                    .failure_cause()
                    .unwrap_or_else(|| anyhow::anyhow!("build failed"));
                Err(ProjectCannotStart::with_cause("Build returned error", cause))
            }
            Err(e) => Err(ProjectCannotStart::with_cause(
                format!("Error while building {}", self.project_root.display()),
                e,
            )),
        }
    }

    /// Forcefully stop the running process, if any. Never fails; safe to call
    /// before `start`, after a failed `start`, and repeatedly.
    pub fn shutdown(&self) {
        match self.take_process() {
            Some(handle) => {
                info!(project = %self.project_root.display(), pid = handle.pid(), "shutting down");
                handle.destroy();
            }
            None => debug!(project = %self.project_root.display(), "shutdown with no process"),
        }
    }

    /// Handle to the process left by the last successful `start`, until
    /// `shutdown` is called.
    ///
    /// A process that exits on its own keeps its handle here, with
    /// [`ProcessHandle::has_exited`] reporting `true`, so callers can still read
    /// its exit status. `shutdown` then clears it without signalling anything.
    pub fn process(&self) -> Option<ProcessHandle> {
        self.process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_process(&self) -> Option<ProcessHandle> {
        self.process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("project_root", &self.project_root)
            .field("tool", &self.tool.name())
            .field("runtime", &self.runtime.to_string())
            .field("goals", &self.goals)
            .field("process", &self.process())
            .finish()
    }
}
