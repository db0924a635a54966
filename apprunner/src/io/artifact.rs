//! Resolve the built artifact on disk.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::artifact::{ArtifactCoordinates, ArtifactLayout};
use crate::error::ProjectCannotStart;

/// Return the absolute path of the artifact for `coords`, failing when it is
/// not a regular file. A successful build that produced nothing usable is its
/// own failure, distinct from a failed build.
pub fn locate_artifact(
    project_root: &Path,
    layout: &ArtifactLayout,
    coords: &ArtifactCoordinates,
) -> Result<PathBuf, ProjectCannotStart> {
    let path = layout.path_in(project_root, coords);
    if !path.is_file() {
        warn!(path = %path.display(), "artifact missing after build");
        return Err(ProjectCannotStart::new(format!(
            "Could not find the {} file at {}",
            layout.extension,
            path.display()
        )));
    }
    debug!(path = %path.display(), "artifact located");
    Ok(path)
}
