//! Case metadata persistence seam

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CaseId, CaseRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence of case records, owned outside the storage layer
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace a record
    async fn save(&self, record: &CaseRecord) -> Result<()>;

    async fn find(&self, id: CaseId) -> Result<Option<CaseRecord>>;

    /// Drop a record; unknown ids are ignored
    async fn delete(&self, id: CaseId) -> Result<()>;

    /// Ids of every case whose expiration is at or before `now`
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<CaseId>>;
}

/// Metadata kept in process memory
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<CaseId, CaseRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn save(&self, record: &CaseRecord) -> Result<()> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn find(&self, id: CaseId) -> Result<Option<CaseRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: CaseId) -> Result<()> {
        self.records.write().await.remove(&id);
        Ok(())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<CaseId>> {
        let mut expired: Vec<CaseId> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.id)
            .collect();
        expired.sort();
        Ok(expired)
    }
}
