use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Database schema manager
pub struct Schema;

impl Schema {
    /// Initialize all database tables and indexes
    pub async fn initialize(pool: &PgPool) -> Result<()> {
        Self::create_cases_table(pool).await?;
        Self::create_indexes(pool).await?;
        info!("PostgreSQL case metadata initialized");
        Ok(())
    }

    /// Create cases table
    async fn create_cases_table(pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cases (
                id UUID PRIMARY KEY,
                original_filename VARCHAR(255) NOT NULL,
                format VARCHAR(64) NOT NULL,
                compression VARCHAR(8) NOT NULL,
                archive VARCHAR(8) NOT NULL,
                indexed BOOLEAN NOT NULL DEFAULT FALSE,
                expires_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create cases table")?;
        Ok(())
    }

    /// Create indexes for better query performance
    async fn create_indexes(pool: &PgPool) -> Result<()> {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cases_expires_at ON cases(expires_at) WHERE expires_at IS NOT NULL",
        )
        .execute(pool)
        .await
        .context("Failed to create expiration index")?;
        Ok(())
    }
}
