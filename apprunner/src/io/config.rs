//! Runner configuration stored in `apprunner.toml`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::types::LaunchCommand;
use crate::io::build::MavenBuild;
use crate::io::runtime::JavaRuntime;
use crate::io::waiter::{Immediate, OutputPatternWaiter, StartupWaiter};

pub const DEFAULT_CONFIG_FILE: &str = "apprunner.toml";

/// Runner configuration (TOML).
///
/// Edited by humans. Missing fields fall back to defaults that run
/// `mvn -B clean package` and launch with `java` from `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppRunnerConfig {
    pub maven: MavenConfig,
    pub java: JavaConfig,
    pub startup: StartupConfig,
    /// Extra environment variables for launched applications.
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MavenConfig {
    /// Maven launcher and leading arguments (e.g. `["mvn","-B"]`).
    pub command: Vec<String>,
    /// Goals run for every build, in order.
    pub goals: Vec<String>,
}

impl Default for MavenConfig {
    fn default() -> Self {
        Self {
            command: vec!["mvn".to_string(), "-B".to_string()],
            goals: vec!["clean".to_string(), "package".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JavaConfig {
    /// JDK directory. Exported as `JAVA_HOME` to builds; `<home>/bin/java`
    /// launches the app unless `command` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
    /// Explicit launcher, e.g. `["/usr/bin/java"]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// JVM options placed before `-jar`.
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StartupConfig {
    /// Regex matched against console lines; the app counts as ready on the
    /// first match. Unset means ready as soon as it is spawned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_pattern: Option<String>,
    /// How long to wait for `ready_pattern`.
    pub timeout_secs: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            ready_pattern: None,
            timeout_secs: 120,
        }
    }
}

impl AppRunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.maven.command.is_empty() || self.maven.command[0].trim().is_empty() {
            return Err(anyhow!("maven.command must be a non-empty array"));
        }
        if self.maven.goals.is_empty() {
            return Err(anyhow!("maven.goals must not be empty"));
        }
        if let Some(command) = &self.java.command
            && (command.is_empty() || command[0].trim().is_empty())
        {
            return Err(anyhow!("java.command must be a non-empty array when set"));
        }
        if self.startup.timeout_secs == 0 {
            return Err(anyhow!("startup.timeout_secs must be > 0"));
        }
        if let Some(pattern) = &self.startup.ready_pattern {
            Regex::new(pattern).context("startup.ready_pattern is not a valid regex")?;
        }
        Ok(())
    }

    pub fn maven_build(&self) -> Result<MavenBuild> {
        let command = LaunchCommand::from_argv(&self.maven.command)
            .ok_or_else(|| anyhow!("maven.command must be a non-empty array"))?;
        Ok(MavenBuild::with_command(command))
    }

    pub fn java_runtime(&self) -> Result<JavaRuntime> {
        let mut runtime = match &self.java.home {
            Some(home) => JavaRuntime::from_home(home),
            None => JavaRuntime::on_path(),
        };
        if let Some(command) = &self.java.command {
            let launcher = LaunchCommand::from_argv(command)
                .ok_or_else(|| anyhow!("java.command must be a non-empty array when set"))?;
            runtime = runtime.with_launcher(launcher);
        }
        Ok(runtime.with_options(self.java.options.clone()))
    }
}

impl StartupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the waiter described by this section.
    pub fn waiter(&self) -> Result<Box<dyn StartupWaiter>> {
        match &self.ready_pattern {
            Some(pattern) => {
                let regex = Regex::new(pattern)
                    .with_context(|| format!("compile ready pattern {pattern:?}"))?;
                Ok(Box::new(OutputPatternWaiter::new(regex, self.timeout())))
            }
            None => Ok(Box::new(Immediate)),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppRunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppRunnerConfig> {
    if !path.exists() {
        let cfg = AppRunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppRunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AppRunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
