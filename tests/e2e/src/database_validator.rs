use anyhow::{Context, Result};
use common::CaseRecord;
use sqlx::PgPool;

/// Check the row written for a case in the `cases` table
pub async fn validate_case(database_url: &str, record: &CaseRecord) -> Result<()> {
    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    let row: Option<(String, String, String, String)> = sqlx::query_as(
        "SELECT original_filename, format, compression, archive FROM cases WHERE id = $1",
    )
    .bind(record.id)
    .fetch_optional(&pool)
    .await
    .context("Failed to look up case")?;

    let Some((original_filename, format, compression, archive)) = row else {
        anyhow::bail!("Case {} not found in database", record.id);
    };
    println!("  ✓ Case {} exists in database", record.id);

    if original_filename != record.original_filename || format != record.format {
        anyhow::bail!(
            "Case {} row differs: {} / {} (expected {} / {})",
            record.id,
            original_filename,
            format,
            record.original_filename,
            record.format
        );
    }
    if compression != record.compression.as_str() || archive != record.archive.as_str() {
        anyhow::bail!(
            "Case {} kinds differ: {} / {} (expected {} / {})",
            record.id,
            compression,
            archive,
            record.compression,
            record.archive
        );
    }
    println!("  ✓ Case row matches ({}, {})", original_filename, format);
    Ok(())
}

pub async fn validate_case_removed(database_url: &str, case_id: uuid::Uuid) -> Result<()> {
    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to database")?;
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM cases WHERE id = $1)")
            .bind(case_id)
            .fetch_one(&pool)
            .await
            .context("Failed to check if case exists")?;
    if exists {
        anyhow::bail!("Case {} still in database after delete", case_id);
    }
    println!("  ✓ Case {} removed from database", case_id);
    Ok(())
}

/// Remove the rows left behind by this test run
pub async fn cleanup_test_data(database_url: &str, case_ids: &[uuid::Uuid]) -> Result<()> {
    let keep_data = std::env::var("KEEP_TEST_DATA").unwrap_or_else(|_| "false".to_string());
    if keep_data == "true" {
        println!("⚠️  Keeping database test data (KEEP_TEST_DATA=true)");
        return Ok(());
    }

    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to database for cleanup")?;

    println!("🧹 Cleaning up database test data...");
    for case_id in case_ids {
        sqlx::query("DELETE FROM cases WHERE id = $1")
            .bind(case_id)
            .execute(&pool)
            .await
            .context("Failed to delete case from database")?;
    }
    println!("✅ Database test data cleaned up");
    Ok(())
}
