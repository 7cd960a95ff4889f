//! Per-task working directory handling.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use super::commands::{is_artifact_name, pick_artifact, SAVE_NAME, TRANSCODED_NAME};
use super::types::RunError;

/// Creates the working directory and removes leftovers of a previous attempt.
///
/// A previously materialized playlist is kept so a retry can reuse it.
pub(crate) async fn prepare(dir: &Path) -> Result<(), RunError> {
    fs::create_dir_all(dir).await.map_err(|e| {
        RunError::io(
            format!("failed to create working directory {}", dir.display()),
            e,
        )
    })?;

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| RunError::io(format!("failed to read {}", dir.display()), e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RunError::io(format!("failed to read {}", dir.display()), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);

        let removal = if is_dir && name == SAVE_NAME {
            fs::remove_dir_all(&path).await
        } else if !is_dir && (is_artifact_name(&name) || name == TRANSCODED_NAME) {
            fs::remove_file(&path).await
        } else {
            continue;
        };
        removal.map_err(|e| {
            RunError::io(format!("failed to remove stale {}", path.display()), e)
        })?;
        debug!(path = %path.display(), "Removed output of a previous attempt");
    }
    Ok(())
}

/// Finds the fetcher's output in `dir`.
pub(crate) async fn locate_artifact(dir: &Path) -> Result<PathBuf, RunError> {
    let names = list_files(dir).await?;
    match pick_artifact(&names) {
        Some(name) => Ok(dir.join(name)),
        None => Err(RunError::ArtifactMissing {
            dir: dir.to_path_buf(),
            present: names,
        }),
    }
}

/// Sorted names of the regular files in `dir`.
pub(crate) async fn list_files(dir: &Path) -> Result<Vec<String>, RunError> {
    let context = || format!("failed to list {}", dir.display());
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| RunError::io(context(), e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RunError::io(context(), e))?
    {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Moves `source` to `destination`, replacing any existing file.
///
/// A rename is atomic on the same filesystem. Across filesystems the file is
/// copied next to the destination first and then renamed over it.
pub(crate) async fn move_into_place(source: &Path, destination: &Path) -> Result<(), RunError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            RunError::io(format!("failed to create {}", parent.display()), e)
        })?;
    }

    match fs::rename(source, destination).await {
        Ok(()) => return Ok(()),
        // Cross-filesystem moves fail with EXDEV (18 on Linux)
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) => {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                "Rename crosses filesystems, copying"
            );
        }
        Err(e) => {
            return Err(RunError::io(
                format!(
                    "failed to move {} to {}",
                    source.display(),
                    destination.display()
                ),
                e,
            ))
        }
    }

    let staging = staging_path(destination);
    let copy_error = |e| {
        RunError::io(
            format!("failed to copy {} to {}", source.display(), staging.display()),
            e,
        )
    };
    fs::copy(source, &staging).await.map_err(copy_error)?;
    if let Err(e) = fs::rename(&staging, destination).await {
        let _ = fs::remove_file(&staging).await;
        return Err(RunError::io(
            format!("failed to move {} into place", staging.display()),
            e,
        ));
    }
    if let Err(e) = fs::remove_file(source).await {
        warn!(path = %source.display(), "Failed to remove source after copy: {}", e);
    }
    Ok(())
}

/// Best-effort removal; failures are logged only.
pub(crate) async fn remove(dir: &Path) {
    match fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Working directory removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), "Failed to remove working directory: {}", e),
    }
}

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.partial"))
}
