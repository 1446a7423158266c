//! Filesystem-based storage implementation

pub mod metadata;

pub use metadata::FileMetadataStore;

use crate::error::{CaseError, Result};
use crate::{key_layout, ObjectReader, Storage};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

/// Filesystem-based storage implementation.
///
/// Keys map onto paths below `root`; a case is the directory `root/<case-id>`.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Open storage on an existing root directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CaseError::StorageNotInitialized(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn case_dir(&self, case_id: Uuid) -> PathBuf {
        self.path_for(&key_layout::case_prefix(case_id))
    }

    fn key_for_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|component| match component {
                Component::Normal(segment) => segment.to_str(),
                _ => None,
            })
            .collect();
        segments.map(|segments| segments.join("/"))
    }

    /// Find the file of a single-file case: the first non-directory entry of
    /// its directory. An existing directory without one is `DirectoryEmpty`,
    /// a missing directory is `NotFound`.
    pub async fn walk_case_directory(&self, case_id: Uuid) -> Result<PathBuf> {
        let dir = self.case_dir(case_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CaseError::NotFound(format!("case directory {}", case_id)))
            }
            Err(e) => return Err(CaseError::storage(format!("read {:?}", dir), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CaseError::storage(format!("read {:?}", dir), e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CaseError::storage(format!("stat {:?}", entry.path()), e))?;
            if !file_type.is_dir() {
                return Ok(entry.path());
            }
        }

        Err(CaseError::DirectoryEmpty(case_id))
    }

    /// Every regular file below `dir`, recursively
    async fn collect_files(&self, dir: PathBuf) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(CaseError::storage(format!("read {:?}", dir), e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| CaseError::storage(format!("read {:?}", dir), e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| CaseError::storage(format!("stat {:?}", entry.path()), e))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(entry.path());
                }
            }
        }

        Ok(files)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CaseError::storage(format!("create directory {:?}", parent), e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    async fn write(&self, key: &str, mut content: ObjectReader, _content_type: &str) -> Result<u64> {
        let path = self.path_for(key);
        self.ensure_parent(&path).await?;

        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| CaseError::storage(format!("create {}", key), e))?;
        let mut writer = BufWriter::new(file);
        let size = tokio::io::copy(&mut content, &mut writer)
            .await
            .map_err(|e| CaseError::storage(format!("write {}", key), e))?;
        writer
            .flush()
            .await
            .map_err(|e| CaseError::storage(format!("write {}", key), e))?;
        // Sync file data to disk before reporting the object as stored
        writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| CaseError::storage(format!("sync {}", key), e))?;

        debug!("Wrote {} ({} bytes)", key, size);
        Ok(size)
    }

    async fn read(&self, key: &str) -> Result<ObjectReader> {
        let path = self.path_for(key);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CaseError::NotFound(key.to_string())),
            Err(e) => Err(CaseError::storage(format!("read {}", key), e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match tokio::fs::metadata(self.path_for(key)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CaseError::storage(format!("stat {}", key), e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.path_for(prefix);
        let files = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => vec![path],
            Ok(_) => self.collect_files(path).await?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CaseError::storage(format!("stat {}", prefix), e)),
        };

        let mut keys: Vec<String> = files
            .iter()
            .filter_map(|file| self.key_for_path(file))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let source = self.path_for(from);
        let target = self.path_for(to);
        self.ensure_parent(&target).await?;

        match tokio::fs::copy(&source, &target).await {
            Ok(bytes) => {
                debug!("Copied {} to {} ({} bytes)", from, to, bytes);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CaseError::NotFound(from.to_string())),
            Err(e) => Err(CaseError::storage(format!("copy {} to {}", from, to), e)),
        }
    }

    async fn delete(&self, prefix: &str) -> Result<()> {
        let path = self.path_for(prefix);
        if path == self.root {
            return Err(CaseError::storage(
                "refusing to delete the storage root",
                std::io::Error::from(ErrorKind::InvalidInput),
            ));
        }

        let removed = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => {
                debug!("Deleted {}", prefix);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaseError::storage(format!("delete {}", prefix), e)),
        }
    }

    async fn reserve(&self, prefix: &str) -> Result<()> {
        let path = self.path_for(prefix);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(CaseError::DirectoryAlreadyExists(prefix.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CaseError::StorageNotInitialized(self.root.clone()))
            }
            Err(e) => Err(CaseError::storage(format!("create directory {}", prefix), e)),
        }
    }

    async fn single_object_exists(&self, case_id: Uuid, key: &str) -> Result<bool> {
        match self.walk_case_directory(case_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        }

        let files = self.collect_files(self.case_dir(case_id)).await?;
        if files.len() > 1 {
            warn!(
                "Case directory {} holds {} files where a single file was expected",
                case_id,
                files.len()
            );
        }
        self.exists(key).await
    }
}
