//! Case storage engine.
//!
//! Orchestrates classification, archive explosion, physical storage and the
//! metadata/format/notification collaborators behind one contract keyed by
//! case id. Imports are all-or-nothing: anything written for a case that
//! fails to import is deleted again before the error is returned.

use crate::archive::{self, ArchiveLimits, Classification, ExplodedMember};
use crate::config::EngineConfig;
use crate::detector::FormatDetector;
use crate::error::{CaseError, Result};
use crate::key_layout;
use crate::metadata::MetadataStore;
use crate::notification::NotificationSink;
use crate::temp::TempResourceManager;
use crate::{ObjectReader, Storage};
use chrono::{DateTime, Utc};
use common::file_utils::{validate_case_filename, validate_member_name};
use common::{CaseEvent, CaseId, CaseRecord, CompressionKind, ImportOptions};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// External services the engine depends on
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataStore>,
    pub detector: Arc<dyn FormatDetector>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// Cheap to clone; clones share the same backend and collaborators
#[derive(Clone)]
pub struct CaseStorageEngine {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn Storage>,
    metadata: Arc<dyn MetadataStore>,
    detector: Arc<dyn FormatDetector>,
    notifier: Arc<dyn NotificationSink>,
    temp: TempResourceManager,
    limits: ArchiveLimits,
}

/// Where a member lives and which compression layer wraps it
struct MemberLocation {
    key: String,
    compression: CompressionKind,
}

/// Record fields chosen by the caller rather than derived from the content
#[derive(Debug, Clone, Copy)]
struct Lifetime {
    indexed: bool,
    expires_at: Option<DateTime<Utc>>,
}

impl Lifetime {
    fn resolve(options: &ImportOptions) -> Result<Self> {
        Ok(Self {
            indexed: options.indexed,
            expires_at: options.expires_at(Utc::now())?,
        })
    }
}

/// Directory next to the staged upload that receives exploded members
fn member_staging_dir(staged: &Path) -> PathBuf {
    staged.with_file_name("members")
}

impl CaseStorageEngine {
    pub fn new(storage: Arc<dyn Storage>, collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                metadata: collaborators.metadata,
                detector: collaborators.detector,
                notifier: collaborators.notifier,
                temp: TempResourceManager::new(config.temp_root),
                limits: config.archive_limits,
            }),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    /// Import a case from `content` under a fresh id.
    ///
    /// The write phase runs on its own task: dropping the returned future
    /// does not interrupt it, so an abandoned import still completes or
    /// rolls back.
    pub async fn import<R>(&self, filename: &str, content: R, options: ImportOptions) -> Result<CaseRecord>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        validate_case_filename(filename).map_err(|reason| CaseError::illegal_name(filename, reason))?;
        let lifetime = Lifetime::resolve(&options)?;

        let case_id = Uuid::new_v4();
        let engine = self.clone();
        let filename = filename.to_string();
        tokio::spawn(async move { engine.import_case(case_id, filename, content, lifetime).await }).await?
    }

    async fn import_case<R>(
        &self,
        case_id: CaseId,
        filename: String,
        mut content: R,
        lifetime: Lifetime,
    ) -> Result<CaseRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let classification = archive::classify(&filename);
        info!("Importing case {} from {} ({:?})", case_id, filename, classification);

        let name = filename.as_str();
        self.inner
            .temp
            .with_temp(case_id, name, |staged| async move {
                let size = stage(&mut content, &staged).await?;
                debug!("Staged {} bytes for case {}", size, case_id);
                self.persist(case_id, name, classification, &staged, lifetime).await
            })
            .await
    }

    async fn persist(
        &self,
        case_id: CaseId,
        filename: &str,
        classification: Classification,
        staged: &Path,
        lifetime: Lifetime,
    ) -> Result<CaseRecord> {
        // Explode before anything is written so oversized archives leave no trace
        let members = match classification {
            Classification::Archived(kind) => {
                let path = staged.to_path_buf();
                let staging_dir = member_staging_dir(staged);
                let name = filename.to_string();
                let limits = self.inner.limits;
                let members = tokio::task::spawn_blocking(move || {
                    archive::explode(&path, &name, kind, &limits, &staging_dir)
                })
                .await??;
                Some(members)
            }
            _ => None,
        };

        self.inner
            .storage
            .reserve(&key_layout::case_prefix(case_id))
            .await?;

        let stored = async {
            self.write_case(case_id, filename, classification, staged, members)
                .await?;
            self.detect_format(filename, staged).await
        }
        .await;

        let format = match stored {
            Ok(format) => format,
            Err(e) => {
                self.rollback(case_id).await;
                return Err(e);
            }
        };

        let record = CaseRecord {
            id: case_id,
            original_filename: filename.to_string(),
            format,
            compression: classification.compression(),
            archive: classification.archive(),
            indexed: lifetime.indexed,
            expires_at: lifetime.expires_at,
        };

        if let Err(e) = self.inner.metadata.save(&record).await {
            self.rollback(case_id).await;
            return Err(CaseError::metadata(e));
        }

        self.notify(&record).await;
        info!(
            "Imported case {} ({}, format {})",
            case_id, record.original_filename, record.format
        );
        Ok(record)
    }

    async fn write_case(
        &self,
        case_id: CaseId,
        filename: &str,
        classification: Classification,
        staged: &Path,
        members: Option<Vec<ExplodedMember>>,
    ) -> Result<()> {
        let storage = &self.inner.storage;

        let stored = archive::stored_name(filename, classification);
        let upload = open_staged(staged).await?;
        let content = match classification {
            Classification::Plain => archive::compress_gzip(upload),
            _ => upload,
        };
        let size = storage
            .write(
                &key_layout::key_for(case_id, &stored),
                content,
                archive::content_type(&stored),
            )
            .await?;
        debug!("Stored {} for case {} ({} bytes)", stored, case_id, size);

        for member in members.into_iter().flatten() {
            let stored = archive::recompose(&member.name);
            storage
                .write(
                    &key_layout::key_for(case_id, &stored),
                    open_staged(&member.staged).await?,
                    archive::content_type(&stored),
                )
                .await?;
        }
        Ok(())
    }

    async fn detect_format(&self, filename: &str, staged: &Path) -> Result<String> {
        match self.inner.detector.detect(filename, staged).await {
            Ok(Some(format)) => Ok(format),
            Ok(None) => Err(CaseError::NotImportable(format!(
                "{}: format not recognized",
                filename
            ))),
            Err(source) => Err(CaseError::Collaborator {
                name: "Format detector",
                source,
            }),
        }
    }

    /// Best-effort removal of everything written for a case
    async fn rollback(&self, case_id: CaseId) {
        match self
            .inner
            .storage
            .delete(&key_layout::case_prefix(case_id))
            .await
        {
            Ok(()) => debug!("Rolled back case {}", case_id),
            Err(e) => warn!("Failed to roll back case {}: {}", case_id, e),
        }
    }

    async fn notify(&self, record: &CaseRecord) {
        if let Err(e) = self.inner.notifier.publish(&CaseEvent::from(record)).await {
            warn!("Failed to publish event for case {}: {:#}", record.id, e);
        }
    }

    pub async fn find_case(&self, case_id: CaseId) -> Result<Option<CaseRecord>> {
        self.inner
            .metadata
            .find(case_id)
            .await
            .map_err(CaseError::metadata)
    }

    async fn require_case(&self, case_id: CaseId) -> Result<CaseRecord> {
        self.find_case(case_id)
            .await?
            .ok_or_else(|| CaseError::NotFound(format!("case {}", case_id)))
    }

    fn canonical_key(record: &CaseRecord) -> (Classification, String) {
        let classification = archive::classify(&record.original_filename);
        let stored = archive::stored_name(&record.original_filename, classification);
        (classification, key_layout::key_for(record.id, &stored))
    }

    /// Whether the case has a record and its stored file
    pub async fn case_exists(&self, case_id: CaseId) -> Result<bool> {
        match self.find_case(case_id).await? {
            Some(record) => {
                let (_, key) = Self::canonical_key(&record);
                self.inner.storage.exists(&key).await
            }
            None => Ok(false),
        }
    }

    /// Stream of the whole case file with its compression layer removed.
    /// Archives are returned exactly as uploaded.
    pub async fn retrieve(&self, case_id: CaseId) -> Result<ObjectReader> {
        let record = self.require_case(case_id).await?;
        let (classification, key) = Self::canonical_key(&record);
        let content = self.inner.storage.read(&key).await?;
        let layer = match classification {
            Classification::Plain => CompressionKind::Gz,
            Classification::Compressed(kind) => kind,
            Classification::Archived(_) => CompressionKind::None,
        };
        Ok(archive::decompress(layer, content))
    }

    fn locate_member(
        record: &CaseRecord,
        classification: Classification,
        name: &str,
    ) -> Result<Option<MemberLocation>> {
        match classification {
            Classification::Archived(_) => {
                validate_member_name(name).map_err(|reason| CaseError::illegal_name(name, reason))?;
                Ok(Some(MemberLocation {
                    key: key_layout::key_for(record.id, &archive::recompose(name)),
                    compression: CompressionKind::Gz,
                }))
            }
            _ if name == archive::logical_name(&record.original_filename, classification) => {
                let (_, key) = Self::canonical_key(record);
                let compression = match classification {
                    Classification::Compressed(kind) => kind,
                    _ => CompressionKind::Gz,
                };
                Ok(Some(MemberLocation { key, compression }))
            }
            _ => Ok(None),
        }
    }

    /// Stream of the decompressed content of one member of a case. Archives
    /// answer to their member names; single-file cases to their logical name.
    pub async fn retrieve_member(&self, case_id: CaseId, name: &str) -> Result<ObjectReader> {
        let record = self.require_case(case_id).await?;
        let classification = archive::classify(&record.original_filename);
        let location = Self::locate_member(&record, classification, name)?
            .ok_or_else(|| CaseError::NotFound(format!("member {} of case {}", name, case_id)))?;

        let content = self.inner.storage.read(&location.key).await?;
        Ok(archive::decompress(location.compression, content))
    }

    /// Presence check consistent with [`Self::retrieve_member`], without
    /// reading any content
    pub async fn member_exists(&self, case_id: CaseId, name: &str) -> Result<bool> {
        let Some(record) = self.find_case(case_id).await? else {
            return Ok(false);
        };
        let classification = archive::classify(&record.original_filename);
        let location = match Self::locate_member(&record, classification, name) {
            Ok(Some(location)) => location,
            Ok(None) | Err(CaseError::IllegalName { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        if classification.is_archive() {
            self.inner.storage.exists(&location.key).await
        } else {
            self.inner.storage.single_object_exists(case_id, &location.key).await
        }
    }

    /// Member names of a case, sorted, optionally restricted to those fully
    /// matching `filter`
    pub async fn list_members(&self, case_id: CaseId, filter: Option<&str>) -> Result<Vec<String>> {
        let filter = filter
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern)))
            .transpose()?;
        let record = self.require_case(case_id).await?;
        let (classification, canonical) = Self::canonical_key(&record);

        let mut names: Vec<String> = if classification.is_archive() {
            self.inner
                .storage
                .list(&key_layout::case_prefix(case_id))
                .await?
                .iter()
                .filter_map(|key| key_layout::relative_name(case_id, key))
                .filter(|stored| *stored != record.original_filename)
                .filter_map(archive::decompose)
                .map(str::to_string)
                .collect()
        } else if self.inner.storage.single_object_exists(case_id, &canonical).await? {
            vec![archive::logical_name(&record.original_filename, classification).to_string()]
        } else {
            Vec::new()
        };

        if let Some(filter) = &filter {
            names.retain(|name| filter.is_match(name));
        }
        names.sort();
        Ok(names)
    }

    /// Copy a case under a new id without downloading it
    pub async fn duplicate(&self, source_id: CaseId, options: ImportOptions) -> Result<CaseRecord> {
        let lifetime = Lifetime::resolve(&options)?;
        let engine = self.clone();
        tokio::spawn(async move { engine.duplicate_case(source_id, lifetime).await }).await?
    }

    async fn duplicate_case(&self, source_id: CaseId, lifetime: Lifetime) -> Result<CaseRecord> {
        let storage = &self.inner.storage;
        let source = self
            .find_case(source_id)
            .await?
            .ok_or(CaseError::SourceNotFound(source_id))?;

        let (classification, canonical) = Self::canonical_key(&source);
        if !storage.exists(&canonical).await? {
            return Err(CaseError::SourceNotFound(source_id));
        }
        let keys = if classification.is_archive() {
            storage.list(&key_layout::case_prefix(source_id)).await?
        } else {
            vec![canonical]
        };

        let case_id = Uuid::new_v4();
        storage.reserve(&key_layout::case_prefix(case_id)).await?;

        let copied: Result<CaseRecord> = async {
            for key in &keys {
                let Some(relative) = key_layout::relative_name(source_id, key) else {
                    continue;
                };
                storage
                    .copy(key, &key_layout::key_for(case_id, relative))
                    .await
                    .map_err(|e| match e {
                        CaseError::NotFound(_) => CaseError::SourceNotFound(source_id),
                        other => other,
                    })?;
            }

            let record = CaseRecord {
                id: case_id,
                indexed: lifetime.indexed,
                expires_at: lifetime.expires_at,
                ..source.clone()
            };
            self.inner
                .metadata
                .save(&record)
                .await
                .map_err(CaseError::metadata)?;
            Ok(record)
        }
        .await;

        match copied {
            Ok(record) => {
                self.notify(&record).await;
                info!("Duplicated case {} into {}", source_id, case_id);
                Ok(record)
            }
            Err(e) => {
                self.rollback(case_id).await;
                Err(e)
            }
        }
    }

    /// Delete a case and its record. Unknown ids are not an error.
    pub async fn delete(&self, case_id: CaseId) -> Result<()> {
        self.inner
            .storage
            .delete(&key_layout::case_prefix(case_id))
            .await?;
        self.inner
            .metadata
            .delete(case_id)
            .await
            .map_err(CaseError::metadata)?;
        info!("Deleted case {}", case_id);
        Ok(())
    }

    /// Clear the expiration of a case; false when the case is unknown
    pub async fn disable_expiration(&self, case_id: CaseId) -> Result<bool> {
        let Some(mut record) = self.find_case(case_id).await? else {
            return Ok(false);
        };
        if record.expires_at.take().is_some() {
            self.inner
                .metadata
                .save(&record)
                .await
                .map_err(CaseError::metadata)?;
        }
        Ok(true)
    }

    pub async fn expired_cases(&self, now: DateTime<Utc>) -> Result<Vec<CaseId>> {
        self.inner
            .metadata
            .find_expired(now)
            .await
            .map_err(CaseError::metadata)
    }
}

/// Copy the caller's stream into the staging file
async fn stage<R: AsyncRead + Unpin>(content: &mut R, staged: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(staged).await?;
    let size = tokio::io::copy(content, &mut file).await?;
    file.flush().await?;
    Ok(size)
}

async fn open_staged(path: &Path) -> Result<ObjectReader> {
    let file = tokio::fs::File::open(path).await?;
    Ok(Box::pin(tokio::io::BufReader::new(file)))
}
