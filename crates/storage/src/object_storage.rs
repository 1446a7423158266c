//! Object store implementation over any `object_store` backend (S3,
//! in-memory). Copies are server-side; existence checks are HEAD requests.
//!
//! Keys are split on `/` and each segment becomes one path part, which
//! `object_store` percent-encodes as needed. Listed locations are decoded
//! back, so callers only ever see the keys they wrote.

use crate::error::{CaseError, Result};
use crate::{ObjectReader, Storage};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::buffered::BufWriter;
use object_store::path::{Path as ObjectPath, PathPart};
use object_store::{Attribute, Attributes, ObjectStore};
use percent_encoding::percent_decode_str;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    /// Location inside the bucket under which all cases live
    root: ObjectPath,
}

impl ObjectStoreStorage {
    pub fn new(store: Arc<dyn ObjectStore>, root: Option<String>) -> Self {
        let root = root
            .as_deref()
            .map(|r| ObjectPath::from_iter(r.split('/')))
            .unwrap_or_default();
        Self { store, root }
    }

    fn location(&self, key: &str) -> ObjectPath {
        ObjectPath::from_iter(self.root.parts().chain(key.split('/').map(PathPart::from)))
    }

    fn key_of(&self, location: &ObjectPath) -> Option<String> {
        let segments: Option<Vec<String>> = location
            .prefix_match(&self.root)?
            .map(|part| {
                percent_decode_str(part.as_ref())
                    .decode_utf8()
                    .ok()
                    .map(|segment| segment.into_owned())
            })
            .collect();
        segments.map(|segments| segments.join("/"))
    }

    fn not_found_or(key: &str, err: object_store::Error) -> CaseError {
        match err {
            object_store::Error::NotFound { .. } => CaseError::NotFound(key.to_string()),
            other => CaseError::ObjectStore(other),
        }
    }
}

#[async_trait]
impl Storage for ObjectStoreStorage {
    async fn write(&self, key: &str, mut content: ObjectReader, content_type: &str) -> Result<u64> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        // Small objects go out as one put, larger ones as a multipart upload
        let mut writer =
            BufWriter::new(self.store.clone(), self.location(key)).with_attributes(attributes);
        let uploaded = async {
            let size = tokio::io::copy(&mut content, &mut writer).await?;
            writer.shutdown().await?;
            Ok::<u64, io::Error>(size)
        }
        .await;

        match uploaded {
            Ok(size) => {
                debug!("Put {} ({} bytes)", key, size);
                Ok(size)
            }
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    warn!("Failed to abort upload of {}: {}", key, abort);
                }
                Err(CaseError::storage(format!("upload {}", key), e))
            }
        }
    }

    async fn read(&self, key: &str) -> Result<ObjectReader> {
        let result = self
            .store
            .get(&self.location(key))
            .await
            .map_err(|e| Self::not_found_or(key, e))?;
        let stream = result.into_stream().map_err(io::Error::from);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&self.location(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let location = self.location(prefix);
        let objects: Vec<_> = self.store.list(Some(&location)).try_collect().await?;

        let mut keys: Vec<String> = objects
            .iter()
            .filter_map(|meta| self.key_of(&meta.location))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.store
            .copy(&self.location(from), &self.location(to))
            .await
            .map_err(|e| Self::not_found_or(from, e))?;
        debug!("Server-side copy {} to {}", from, to);
        Ok(())
    }

    async fn delete(&self, prefix: &str) -> Result<()> {
        for key in self.list(prefix).await? {
            match self.store.delete(&self.location(&key)).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Deleted {}", prefix);
        Ok(())
    }

    async fn reserve(&self, prefix: &str) -> Result<()> {
        let location = self.location(prefix);
        let mut listing = self.store.list(Some(&location));
        match listing.next().await {
            None => Ok(()),
            Some(Ok(_)) => Err(CaseError::DirectoryAlreadyExists(prefix.to_string())),
            Some(Err(e)) => Err(e.into()),
        }
    }
}
