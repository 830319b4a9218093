//! Resume planning from on-disk state.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::constants::STAGING_SUFFIX;
use super::error::DownloadError;

/// What the local files say about a download before any network I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePlan {
    /// The destination already holds a non-empty file.
    AlreadyComplete {
        /// Size of the existing destination file.
        size: u64,
    },
    /// A staging file with `offset` bytes exists; continue from there.
    Resume {
        /// Bytes already staged.
        offset: u64,
    },
    /// Nothing usable on disk; start from byte 0.
    Fresh,
}

impl ResumePlan {
    /// The byte offset the first transfer attempt starts from.
    #[must_use]
    pub fn offset(self) -> u64 {
        match self {
            Self::Resume { offset } => offset,
            Self::AlreadyComplete { .. } | Self::Fresh => 0,
        }
    }
}

/// Derives the staging path for a destination (`model.glb` → `model.glb.part`).
#[must_use]
pub fn staging_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_else(OsString::new);
    name.push(STAGING_SUFFIX);
    destination.with_file_name(name)
}

/// Inspects the destination and staging files and decides where to start.
///
/// # Errors
///
/// - [`DownloadError::Precondition`] if the destination has no file name, its
///   parent directory is missing, or the destination is a directory.
/// - [`DownloadError::Io`] if file metadata cannot be read for a reason other
///   than the file not existing.
pub async fn plan_resume(
    destination: &Path,
    staging: &Path,
) -> Result<ResumePlan, DownloadError> {
    check_parent_dir(destination).await?;

    if let Some(meta) = metadata_if_exists(destination).await? {
        if meta.is_dir() {
            return Err(DownloadError::precondition(
                destination,
                "destination is a directory",
            ));
        }
        if meta.len() > 0 {
            debug!(size = meta.len(), "destination already complete");
            return Ok(ResumePlan::AlreadyComplete { size: meta.len() });
        }
    }

    match metadata_if_exists(staging).await? {
        Some(meta) if meta.len() > 0 => {
            debug!(offset = meta.len(), "resuming from staging file");
            Ok(ResumePlan::Resume { offset: meta.len() })
        }
        _ => Ok(ResumePlan::Fresh),
    }
}

async fn check_parent_dir(destination: &Path) -> Result<(), DownloadError> {
    if destination.file_name().is_none() {
        return Err(DownloadError::precondition(
            destination,
            "destination has no file name",
        ));
    }
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match metadata_if_exists(parent).await? {
        Some(meta) if meta.is_dir() => Ok(()),
        Some(_) => Err(DownloadError::precondition(
            destination,
            format!("{} is not a directory", parent.display()),
        )),
        None => Err(DownloadError::precondition(
            destination,
            format!("parent directory {} does not exist", parent.display()),
        )),
    }
}

async fn metadata_if_exists(path: &Path) -> Result<Option<std::fs::Metadata>, DownloadError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}
