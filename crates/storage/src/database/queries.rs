use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use common::{CaseId, CaseRecord};
use sqlx::PgPool;

type CaseRow = (
    CaseId,
    String,
    String,
    String,
    String,
    bool,
    Option<DateTime<Utc>>,
);

/// Query operations for case metadata
pub struct Queries;

impl Queries {
    /// Insert a case record, replacing an existing one with the same id
    pub async fn upsert_case(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        record: &CaseRecord,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO cases (id, original_filename, format, compression, archive, indexed, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                original_filename = EXCLUDED.original_filename,
                format = EXCLUDED.format,
                compression = EXCLUDED.compression,
                archive = EXCLUDED.archive,
                indexed = EXCLUDED.indexed,
                expires_at = EXCLUDED.expires_at",
        )
        .bind(record.id)
        .bind(&record.original_filename)
        .bind(&record.format)
        .bind(record.compression.as_str())
        .bind(record.archive.as_str())
        .bind(record.indexed)
        .bind(record.expires_at)
        .execute(pool)
        .await
        .context("Failed to store case record")?;
        Ok(())
    }

    /// Load a case record
    pub async fn find_case(pool: &PgPool, id: CaseId) -> Result<Option<CaseRecord>> {
        let row = sqlx::query_as::<_, CaseRow>(
            "SELECT id, original_filename, format, compression, archive, indexed, expires_at
             FROM cases WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to query case record")?;

        row.map(Self::into_record).transpose()
    }

    /// Delete a case record
    pub async fn delete_case(pool: &PgPool, id: CaseId) -> Result<()> {
        sqlx::query("DELETE FROM cases WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete case record")?;
        Ok(())
    }

    /// Ids of cases expired at `now`
    pub async fn find_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<CaseId>> {
        let rows = sqlx::query_as::<_, (CaseId,)>(
            "SELECT id FROM cases WHERE expires_at IS NOT NULL AND expires_at <= $1 ORDER BY id",
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .context("Failed to query expired cases")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    fn into_record(row: CaseRow) -> Result<CaseRecord> {
        let (id, original_filename, format, compression, archive, indexed, expires_at) = row;
        Ok(CaseRecord {
            id,
            original_filename,
            format,
            compression: compression.parse().map_err(|e: String| anyhow!(e))?,
            archive: archive.parse().map_err(|e: String| anyhow!(e))?,
            indexed,
            expires_at,
        })
    }
}
