//! Utility functions for file operations

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Move a finished file to its final location
///
/// Creates missing parent directories. A plain rename is tried first; when
/// source and destination are on different filesystems the file is copied to a
/// hidden sibling of the destination and renamed into place, so the final path
/// never holds a partial file.
///
/// # Arguments
///
/// * `source` - The staged file
/// * `dest` - The final path
///
/// # Errors
///
/// Returns [`Error::MoveFailed`] when the file cannot be placed. The source is
/// left untouched in that case.
pub async fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| move_failed(source, dest, format!("create parent: {e}")))?;
    }

    match tokio::fs::rename(source, dest).await {
        Ok(()) => {
            tracing::debug!(
                source = %source.display(),
                dest = %dest.display(),
                "moved file by rename"
            );
            Ok(())
        }
        Err(e) if is_cross_device(&e) => copy_then_rename(source, dest).await,
        Err(e) => Err(move_failed(source, dest, e.to_string())),
    }
}

async fn copy_then_rename(source: &Path, dest: &Path) -> Result<()> {
    let partial = partial_path(dest);

    if let Err(e) = tokio::fs::copy(source, &partial).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(move_failed(source, dest, format!("copy: {e}")));
    }
    if let Err(e) = tokio::fs::rename(&partial, dest).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(move_failed(source, dest, format!("rename: {e}")));
    }
    if let Err(e) = tokio::fs::remove_file(source).await {
        tracing::warn!(
            source = %source.display(),
            error = %e,
            "copied across filesystems but could not remove source"
        );
    }

    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        "moved file by copy across filesystems"
    );
    Ok(())
}

/// Hidden sibling used while copying: `dir/.name.partial`
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.partial"))
}

fn is_cross_device(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::CrossesDevices
}

fn move_failed(source: &Path, dest: &Path, reason: String) -> Error {
    Error::MoveFailed {
        source_path: source.to_path_buf(),
        dest_path: dest.to_path_buf(),
        reason,
    }
}

/// Check whether a path exists; unreadable paths count as missing
pub async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
