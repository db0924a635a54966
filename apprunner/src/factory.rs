//! Build-tool detection.
//!
//! Each [`RunnerFactory`] recognises one build-tool family by a marker file
//! at the project root. Callers keep an ordered list of factories and take the
//! first one that claims the project ([`probe_all`]).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::io::build::{BuildTool, MavenBuild};
use crate::io::config::AppRunnerConfig;
use crate::io::runtime::{JavaRuntime, RuntimeProvider};
use crate::runner::Runner;

/// Goals run by a Maven runner unless configured otherwise.
pub const CLEAN_AND_PACKAGE: [&str; 2] = ["clean", "package"];

pub trait RunnerFactory: Send + Sync + fmt::Display {
    /// Return an unstarted runner when `project_root` belongs to this
    /// family, `None` otherwise. Only checks for the marker file.
    fn probe(&self, project_root: &Path) -> Option<Runner>;
}

/// Claims projects with a `pom.xml`.
pub struct MavenRunnerFactory {
    maven: Arc<MavenBuild>,
    runtime: Arc<dyn RuntimeProvider>,
    goals: Vec<String>,
}

impl MavenRunnerFactory {
    pub fn new(runtime: Arc<dyn RuntimeProvider>) -> Self {
        Self {
            maven: Arc::new(MavenBuild::new()),
            runtime,
            goals: CLEAN_AND_PACKAGE.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn from_config(cfg: &AppRunnerConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(cfg.java_runtime()?))
            .with_maven(cfg.maven_build()?)
            .with_goals(cfg.maven.goals.clone()))
    }

    pub fn with_maven(mut self, maven: MavenBuild) -> Self {
        self.maven = Arc::new(maven);
        self
    }

    pub fn with_goals(mut self, goals: Vec<String>) -> Self {
        self.goals = goals;
        self
    }
}

impl Default for MavenRunnerFactory {
    fn default() -> Self {
        Self::new(Arc::new(JavaRuntime::on_path()))
    }
}

impl RunnerFactory for MavenRunnerFactory {
    fn probe(&self, project_root: &Path) -> Option<Runner> {
        if !project_root.join(self.maven.manifest_file()).is_file() {
            return None;
        }
        let root = std::path::absolute(project_root).unwrap_or_else(|_| project_root.to_path_buf());
        Some(Runner::new(
            root,
            self.maven.clone(),
            self.runtime.clone(),
            self.goals.clone(),
        ))
    }
}

impl fmt::Display for MavenRunnerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Maven builder for Java using {}", self.runtime)
    }
}

/// Try `factories` in order and return the first that claims `project_root`,
/// together with the runner it produced.
pub fn probe_all<'a>(
    factories: &'a [Box<dyn RunnerFactory>],
    project_root: &Path,
) -> Option<(&'a dyn RunnerFactory, Runner)> {
    factories.iter().find_map(|factory| {
        let runner = factory.probe(project_root)?;
        debug!(factory = %factory, project = %project_root.display(), "factory claimed project");
        Some((factory.as_ref(), runner))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct MarkerFactory {
        marker: &'static str,
    }

    impl RunnerFactory for MarkerFactory {
        fn probe(&self, project_root: &Path) -> Option<Runner> {
            project_root.join(self.marker).is_file().then(|| {
                Runner::new(
                    project_root,
                    Arc::new(MavenBuild::new()),
                    Arc::new(JavaRuntime::on_path()),
                    vec![self.marker.to_string()],
                )
            })
        }
    }

    impl fmt::Display for MarkerFactory {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "marker {}", self.marker)
        }
    }

    #[test]
    fn maven_probe_without_pom_is_not_applicable() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("build.gradle"), "").expect("write");
        assert!(MavenRunnerFactory::default().probe(temp.path()).is_none());
    }

    #[test]
    fn maven_probe_with_pom_uses_clean_package() {
        let temp = tempfile::tempdir().expect("tempdir");
        // Contents are not validated at probe time.
        fs::write(temp.path().join("pom.xml"), "not even xml").expect("write");

        let runner = MavenRunnerFactory::default()
            .probe(temp.path())
            .expect("maven applies");
        assert_eq!(runner.goals(), ["clean", "package"]);
        assert_eq!(runner.tool_name(), "maven");
        assert!(runner.project_root().is_absolute());
        assert!(runner.process().is_none());
    }

    #[test]
    fn pom_directory_is_not_a_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("pom.xml")).expect("mkdir");
        assert!(MavenRunnerFactory::default().probe(temp.path()).is_none());
    }

    #[test]
    fn configured_goals_are_used() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("pom.xml"), "").expect("write");
        let factory = MavenRunnerFactory::default().with_goals(vec!["verify".to_string()]);
        let runner = factory.probe(temp.path()).expect("maven applies");
        assert_eq!(runner.goals(), ["verify"]);
    }

    #[test]
    fn display_names_the_runtime() {
        assert_eq!(
            MavenRunnerFactory::default().to_string(),
            "Maven builder for Java using java from PATH"
        );
    }

    #[test]
    fn probe_all_takes_first_applicable_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.marker"), "").expect("write");
        fs::write(temp.path().join("b.marker"), "").expect("write");
        let factories: Vec<Box<dyn RunnerFactory>> = vec![
            Box::new(MarkerFactory { marker: "missing.marker" }),
            Box::new(MarkerFactory { marker: "b.marker" }),
            Box::new(MarkerFactory { marker: "a.marker" }),
        ];

        let (factory, runner) = probe_all(&factories, temp.path()).expect("one applies");
        assert_eq!(factory.to_string(), "marker b.marker");
        assert_eq!(runner.goals(), ["b.marker"]);
    }

    #[test]
    fn probe_all_with_no_match_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let factories: Vec<Box<dyn RunnerFactory>> =
            vec![Box::new(MavenRunnerFactory::default())];
        assert!(probe_all(&factories, temp.path()).is_none());
    }
}
