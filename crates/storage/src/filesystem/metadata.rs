use crate::metadata::MetadataStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CaseId, CaseRecord};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const RECORD_EXTENSION: &str = "json";

/// Case records stored as one JSON file per case
pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    /// Open a record directory, creating it when missing
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create metadata directory {:?}", dir))?;
        Ok(Self { dir })
    }

    fn record_file(&self, id: CaseId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Load a record file (None when it does not exist)
    async fn load(record_file: &Path) -> Result<Option<CaseRecord>> {
        let content = match tokio::fs::read_to_string(record_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read case record"),
        };
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse case record {:?}", record_file))?;
        Ok(Some(record))
    }

    /// Save a record with fsync, replacing the previous file atomically
    async fn save_atomic(&self, record: &CaseRecord) -> Result<()> {
        let record_json =
            serde_json::to_string_pretty(record).context("Failed to serialize case record")?;

        let target = self.record_file(record.id);
        let staging = target.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&staging)
            .await
            .context("Failed to create case record file")?;
        file.write_all(record_json.as_bytes())
            .await
            .context("Failed to write case record")?;
        // Sync file data to disk to ensure it's persisted before the rename
        file.sync_all()
            .await
            .context("Failed to sync case record to disk")?;
        drop(file);

        tokio::fs::rename(&staging, &target)
            .await
            .context("Failed to move case record into place")?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn save(&self, record: &CaseRecord) -> Result<()> {
        self.save_atomic(record).await
    }

    async fn find(&self, id: CaseId) -> Result<Option<CaseRecord>> {
        Self::load(&self.record_file(id)).await
    }

    async fn delete(&self, id: CaseId) -> Result<()> {
        match tokio::fs::remove_file(self.record_file(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete case record"),
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<CaseId>> {
        let mut expired = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .context("Failed to read metadata directory")?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let is_record = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| Uuid::parse_str(stem).is_ok());
            if !is_record {
                continue;
            }
            if let Some(record) = Self::load(&path).await? {
                if record.is_expired(now) {
                    expired.push(record.id);
                }
            }
        }

        expired.sort();
        Ok(expired)
    }
}
