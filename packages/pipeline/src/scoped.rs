//! Scoped ownership of transient files.
//!
//! A [`TempArtifact`] deletes its file when dropped unless it was persisted,
//! so TINs, unclipped rasters and half-written outputs never outlive the
//! stage that created them, whether the stage succeeds or fails.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use wse_grids_engine::EngineError;

use crate::PipelineError;

/// A file that is removed when this guard goes out of scope.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    /// Takes ownership of `path`. Nothing is created.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Path of the guarded file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the file to `target`, replacing anything there, and disarms
    /// the guard.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; the file is then still removed
    /// on drop.
    pub fn persist_to(mut self, target: &Path) -> Result<(), PipelineError> {
        fs::rename(&self.path, target).map_err(|e| PipelineError::io(target, e))?;
        self.armed = false;
        Ok(())
    }

    /// Leaves the file where it is and disarms the guard.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::trace!("Removed transient {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// Writes `target` through a sibling `.partial` file that is renamed into
/// place only once `write` succeeds.
///
/// # Errors
///
/// Returns an error if `write` or the rename fails.
pub fn write_atomically<F>(target: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&Path) -> Result<(), EngineError>,
{
    let temp = TempArtifact::new(partial_path(target));
    write(temp.path())?;
    temp.persist_to(target)
}

/// Removes `path` if it exists. Returns whether a file was removed.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn remove_if_exists(path: &Path) -> Result<bool, PipelineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(|| OsString::from("output"), OsString::from);
    name.push(".partial");
    target.with_file_name(name)
}
