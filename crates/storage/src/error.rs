//! Error kinds surfaced by the case storage layer

use common::file_utils::FilenameValidationError;
use common::ExpirationOutOfRange;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T, E = CaseError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Illegal name {name:?}: {reason}")]
    IllegalName {
        name: String,
        reason: FilenameValidationError,
    },
    #[error("Case is not importable: {0}")]
    NotImportable(String),
    #[error("Archive {filename} is too large: {reason}")]
    ArchiveTooLarge { filename: String, reason: String },
    #[error("Case directory already exists: {0}")]
    DirectoryAlreadyExists(String),
    #[error("Case directory {0} is empty")]
    DirectoryEmpty(Uuid),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Failed to create temporary directory under {path:?}")]
    TempDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Temporary file operation failed on {path:?}")]
    TempFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Source case {0} not found")]
    SourceNotFound(Uuid),
    #[error("Storage root {0:?} is not initialized")]
    StorageNotInitialized(PathBuf),
    #[error("Invalid expiration: {0}")]
    InvalidExpiration(#[from] ExpirationOutOfRange),
    #[error("Invalid member filter: {0}")]
    InvalidFilter(#[from] regex::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Storage I/O failed: {context}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("Object store request failed")]
    ObjectStore(#[from] object_store::Error),
    #[error("{name} failed")]
    Collaborator {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("Blocking worker failed")]
    Worker(#[from] tokio::task::JoinError),
}

impl CaseError {
    pub fn illegal_name(name: &str, reason: FilenameValidationError) -> Self {
        CaseError::IllegalName {
            name: name.to_string(),
            reason,
        }
    }

    pub(crate) fn storage(context: impl Into<String>, source: io::Error) -> Self {
        CaseError::Storage {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn metadata(source: anyhow::Error) -> Self {
        CaseError::Collaborator {
            name: "Metadata store",
            source,
        }
    }

    /// True for "not there" outcomes, as opposed to infrastructure failures
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CaseError::NotFound(_) | CaseError::SourceNotFound(_) | CaseError::DirectoryEmpty(_)
        )
    }
}
