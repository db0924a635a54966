//! Deterministic artifact naming: `<id>-<version>.<ext>` under a build output dir.

use std::fmt;
use std::path::{Path, PathBuf};

/// Identifier and version read from a project's build manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCoordinates {
    pub id: String,
    pub version: String,
}

impl ArtifactCoordinates {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.version)
    }
}

/// Where a build tool puts its runnable output, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Output directory relative to the project root (e.g. `target`).
    pub output_dir: PathBuf,
    /// File extension without the dot (e.g. `jar`).
    pub extension: String,
}

impl ArtifactLayout {
    pub fn new(output_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: extension.into(),
        }
    }

    /// Maven's `target/<artifactId>-<version>.jar`.
    pub fn maven() -> Self {
        Self::new("target", "jar")
    }

    /// File name the build tool produces for `coords`.
    pub fn file_name(&self, coords: &ArtifactCoordinates) -> String {
        format!("{}-{}.{}", coords.id, coords.version, self.extension)
    }

    /// Artifact path relative to the project root. Used as the launch argument
    /// since the process runs with the project root as its working directory.
    pub fn relative_path(&self, coords: &ArtifactCoordinates) -> PathBuf {
        self.output_dir.join(self.file_name(coords))
    }

    /// Absolute artifact path under `project_root`.
    pub fn path_in(&self, project_root: &Path, coords: &ArtifactCoordinates) -> PathBuf {
        project_root.join(self.relative_path(coords))
    }
}
