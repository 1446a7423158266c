//! PostgreSQL case metadata implementation

pub mod queries;
pub mod schema;

use crate::config::DatabaseRetryConfig;
use crate::metadata::MetadataStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CaseId, CaseRecord};
use queries::Queries;
use schema::Schema;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

/// PostgreSQL case metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Connect to PostgreSQL, retrying with exponential backoff, and
    /// initialize the schema
    pub async fn connect(database_url: &str, retry_config: &DatabaseRetryConfig) -> Result<Self> {
        let mut delay = Duration::from_secs(retry_config.initial_delay_seconds);
        let mut attempt = 1;

        let pool = loop {
            match PgPool::connect(database_url).await {
                Ok(pool) => break pool,
                Err(e) if attempt < retry_config.max_attempts => {
                    warn!(
                        "Database connection attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, retry_config.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).context("Failed to connect to PostgreSQL database");
                }
            }
        };

        Schema::initialize(&pool).await?;
        info!("Connected to PostgreSQL after {} attempt(s)", attempt);
        Ok(Self { pool })
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn save(&self, record: &CaseRecord) -> Result<()> {
        Queries::upsert_case(&self.pool, record).await
    }

    async fn find(&self, id: CaseId) -> Result<Option<CaseRecord>> {
        Queries::find_case(&self.pool, id).await
    }

    async fn delete(&self, id: CaseId) -> Result<()> {
        Queries::delete_case(&self.pool, id).await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<CaseId>> {
        Queries::find_expired(&self.pool, now).await
    }
}
