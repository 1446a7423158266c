pub mod archive;
pub mod backend;
pub mod config;
pub mod database;
pub mod detector;
pub mod engine;
pub mod error;
pub mod filesystem;
pub mod key_layout;
pub mod metadata;
pub mod notification;
pub mod object_storage;
pub mod sweeper;
pub mod temp;

use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

pub use backend::StorageBackend;
pub use config::{DatabaseRetryConfig, EngineConfig};
pub use detector::{ExtensionFormatDetector, FormatDetector};
pub use engine::{CaseStorageEngine, Collaborators};
pub use error::{CaseError, Result};
pub use metadata::{InMemoryMetadataStore, MetadataStore};
pub use notification::{BroadcastNotificationSink, LoggingNotificationSink, NotificationSink};
pub use sweeper::{ExpirationSweeper, SweepReport};

/// Streamed object content
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Reader over an in-memory buffer
pub fn reader_from(content: impl Into<Bytes>) -> ObjectReader {
    Box::pin(std::io::Cursor::new(content.into()))
}

/// Drain a reader into memory; only meant for small objects
pub async fn read_to_end(mut reader: ObjectReader) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content).await?;
    Ok(content)
}

/// Physical storage of case objects, addressed by `/`-separated keys
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stream `content` into an object, replacing any previous content under
    /// the same key. Returns the number of bytes stored.
    async fn write(&self, key: &str, content: ObjectReader, content_type: &str) -> Result<u64>;

    /// Open an object for streaming; `CaseError::NotFound` when absent
    async fn read(&self, key: &str) -> Result<ObjectReader>;

    /// Check if an object exists without reading it
    async fn exists(&self, key: &str) -> Result<bool>;

    /// List every key under a prefix, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Copy one object to another key without passing through the caller
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Delete every object under a prefix; a missing prefix is not an error
    async fn delete(&self, prefix: &str) -> Result<()>;

    /// Claim a fresh case prefix before writing into it
    async fn reserve(&self, prefix: &str) -> Result<()>;

    /// Existence check for a case expected to hold a single object
    async fn single_object_exists(&self, _case_id: Uuid, key: &str) -> Result<bool> {
        self.exists(key).await
    }
}
