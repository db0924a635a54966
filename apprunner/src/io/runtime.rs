//! Runtime resolution for launching built artifacts.
//!
//! A [`RuntimeProvider`] is resolved once when a factory is built. It supplies
//! the base launch command and may adjust the build command so the build runs
//! against the same runtime (for Java, by exporting `JAVA_HOME`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::types::LaunchCommand;

pub trait RuntimeProvider: Send + Sync + fmt::Display {
    /// Command that runs the artifact at `artifact` (relative to the project root).
    fn launch_command(&self, artifact: &Path) -> LaunchCommand;

    /// Adjust the build invocation before it runs.
    fn prepare_build(&self, _build: &mut Command) {}
}

/// Runs jars with `java -jar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaRuntime {
    launcher: LaunchCommand,
    java_home: Option<PathBuf>,
    options: Vec<String>,
}

impl JavaRuntime {
    /// `java` resolved from `PATH`; the build inherits the caller's `JAVA_HOME`.
    pub fn on_path() -> Self {
        Self {
            launcher: LaunchCommand::new("java"),
            java_home: None,
            options: Vec::new(),
        }
    }

    /// `<home>/bin/java`, with `JAVA_HOME=<home>` exported to the build.
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let java = if cfg!(windows) { "java.exe" } else { "java" };
        Self {
            launcher: LaunchCommand::new(home.join("bin").join(java)),
            java_home: Some(home),
            options: Vec::new(),
        }
    }

    /// Replace the launcher while keeping any configured `JAVA_HOME`.
    pub fn with_launcher(mut self, launcher: LaunchCommand) -> Self {
        self.launcher = launcher;
        self
    }

    /// JVM options placed before `-jar`.
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn java_home(&self) -> Option<&Path> {
        self.java_home.as_deref()
    }
}

impl Default for JavaRuntime {
    fn default() -> Self {
        Self::on_path()
    }
}

impl RuntimeProvider for JavaRuntime {
    fn launch_command(&self, artifact: &Path) -> LaunchCommand {
        self.launcher
            .clone()
            .args(&self.options)
            .arg("-jar")
            .arg(artifact)
    }

    fn prepare_build(&self, build: &mut Command) {
        if let Some(home) = &self.java_home {
            build.env("JAVA_HOME", home);
        }
    }
}

impl fmt::Display for JavaRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.java_home {
            Some(home) => write!(f, "JAVA_HOME {}", home.display()),
            None => write!(f, "{} from PATH", self.launcher.program.to_string_lossy()),
        }
    }
}
