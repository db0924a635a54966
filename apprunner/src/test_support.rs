//! Test-only helpers for throwaway projects and scripted build tools.
//!
//! Real Maven and Java are never needed: [`shell_maven`] and
//! [`shell_runtime`] stand in for them with `sh -c` scripts. The build script
//! sees `-f <pom> <goals...>` as `$1...`; the launcher script sees
//! `-jar <artifact>` as `$1 $2`.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::core::types::LaunchCommand;
use crate::factory::{MavenRunnerFactory, RunnerFactory};
use crate::io::build::MavenBuild;
use crate::io::runtime::JavaRuntime;
use crate::io::sink::MemorySink;
use crate::runner::Runner;

/// A project directory that is removed when dropped.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a minimal `pom.xml` for `artifact_id`/`version`.
    pub fn write_pom(&self, artifact_id: &str, version: &str) {
        self.write_file("pom.xml", &pom_xml(artifact_id, version));
    }

    pub fn write_file(&self, rel: &str, contents: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write project file");
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

pub fn pom_xml(artifact_id: &str, version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>com.example</groupId>
  <artifactId>{artifact_id}</artifactId>
  <version>{version}</version>
  <packaging>jar</packaging>
</project>
"#
    )
}

/// A Maven stand-in that runs `script` in the project directory.
pub fn shell_maven(script: &str) -> MavenBuild {
    MavenBuild::with_command(LaunchCommand::new("sh").arg("-c").arg(script).arg("mvn"))
}

/// A Java stand-in whose launcher runs `script`.
pub fn shell_runtime(script: &str) -> JavaRuntime {
    JavaRuntime::on_path()
        .with_launcher(LaunchCommand::new("sh").arg("-c").arg(script).arg("java"))
}

/// Build script that produces `target/<artifact_id>-<version>.jar`.
pub fn packaging_script(artifact_id: &str, version: &str) -> String {
    format!("echo building; mkdir -p target && echo jar > target/{artifact_id}-{version}.jar")
}

/// Factory wired to scripted Maven and Java.
pub fn shell_factory(build_script: &str, app_script: &str) -> MavenRunnerFactory {
    MavenRunnerFactory::new(Arc::new(shell_runtime(app_script)))
        .with_maven(shell_maven(build_script))
}

/// Runner for `project` built and launched by the given scripts.
pub fn shell_runner(project: &TestProject, build_script: &str, app_script: &str) -> Runner {
    shell_factory(build_script, app_script)
        .probe(project.path())
        .expect("project has a pom.xml")
}

/// Poll `sink` until a line contains `needle` or `timeout` elapses.
pub fn wait_for_line(sink: &MemorySink, needle: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if sink.contains(needle) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    sink.contains(needle)
}
