//! Scoped temporary directories for staging case files.
//!
//! A [`TempResource`] owns a private directory named after the case id and a
//! file path inside it. Dropping it removes the file, then the directory, on
//! every exit path including cancellation and panics. Cleanup failures are
//! logged and never replace the outcome of the guarded operation.

use crate::error::{CaseError, Result};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hands out temporary staging locations under one root directory
#[derive(Debug, Clone)]
pub struct TempResourceManager {
    root: PathBuf,
}

impl TempResourceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a private directory for `id` and reserve `relative_name` in it.
    /// Parent segments of `relative_name` are created as sub-directories.
    pub fn acquire(&self, id: Uuid, relative_name: &str) -> Result<TempResource> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", id))
            .tempdir_in(&self.root)
            .map_err(|source| CaseError::TempDirectory {
                path: self.root.clone(),
                source,
            })?;

        let file = dir.path().join(relative_name);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CaseError::TempDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        debug!("Acquired temporary file {:?}", file);
        Ok(TempResource {
            dir: Some(dir),
            file,
        })
    }

    /// Run `operation` with a fresh temporary file path and release the
    /// resource afterwards whatever the outcome.
    ///
    /// Errors of the operation pass through unchanged, except plain local I/O
    /// failures which are reported as [`CaseError::TempFile`].
    pub async fn with_temp<T, F, Fut>(&self, id: Uuid, relative_name: &str, operation: F) -> Result<T>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let resource = self.acquire(id, relative_name)?;
        let path = resource.path().to_path_buf();
        let outcome = operation(path.clone()).await;
        drop(resource);
        outcome.map_err(|e| match e {
            CaseError::Io(source) => CaseError::TempFile { path, source },
            other => other,
        })
    }
}

impl Default for TempResourceManager {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

/// A temporary directory plus the path of the file staged inside it
#[derive(Debug)]
pub struct TempResource {
    dir: Option<TempDir>,
    file: PathBuf,
}

impl TempResource {
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }
}

impl Drop for TempResource {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete temporary file {:?}: {}", self.file, e),
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to delete temporary directory {:?}: {}", path, e);
            }
        }
    }
}
