use crate::{filesystem::FilesystemStorage, object_storage::ObjectStoreStorage, Result, Storage};
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Storage backend type
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Filesystem storage rooted at an existing directory
    Filesystem(PathBuf),
    /// S3-compatible bucket, credentials taken from the AWS environment
    S3 {
        bucket: String,
        root: Option<String>,
        endpoint: Option<String>,
    },
    /// Process-local object store, lost on exit
    Memory,
}

impl StorageBackend {
    /// Initialize storage backend based on type
    pub async fn initialize(self) -> Result<Arc<dyn Storage>> {
        match self {
            StorageBackend::Filesystem(root) => {
                let storage = FilesystemStorage::open(root)?;
                Ok(Arc::new(storage))
            }
            StorageBackend::S3 {
                bucket,
                root,
                endpoint,
            } => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(&bucket);
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint).with_allow_http(true);
                }
                let store = builder.build()?;
                info!("Using S3 bucket {} (root: {:?})", bucket, root);
                Ok(Arc::new(ObjectStoreStorage::new(Arc::new(store), root)))
            }
            StorageBackend::Memory => {
                info!("Using in-memory object storage");
                Ok(Arc::new(ObjectStoreStorage::new(Arc::new(InMemory::new()), None)))
            }
        }
    }
}
