//! Batch queries.

use chrono::Utc;

use crate::batch::{Batch, BatchPart, BatchPartStatus, BatchStatus};
use crate::db::models::{BatchPartRow, BatchRow};
use crate::db::DbPool;
use crate::error::AppResult;

/// Insert a batch with its parts in one transaction.
pub async fn insert_batch(pool: &DbPool, batch: &Batch, parts: &[BatchPart]) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO migration.batch (
            id, batch_type, search_key, search_key2, status, document,
            status_job_id, created_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&batch.id)
    .bind(&batch.batch_type)
    .bind(&batch.search_key)
    .bind(&batch.search_key2)
    .bind(batch.status.as_str())
    .bind(&batch.document)
    .bind(&batch.status_job_id)
    .bind(batch.created_at)
    .bind(batch.completed_at)
    .execute(&mut *tx)
    .await?;

    for part in parts {
        sqlx::query(
            r#"
            INSERT INTO migration.batch_part (
                id, batch_id, scope_id, status, error, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&part.id)
        .bind(&part.batch_id)
        .bind(&part.scope_id)
        .bind(part.status.as_str())
        .bind(&part.error)
        .bind(part.created_at)
        .bind(part.completed_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_batch(pool: &DbPool, batch_id: &str) -> AppResult<Option<BatchRow>> {
    let row = sqlx::query_as::<_, BatchRow>(
        r#"
        SELECT id, batch_type, search_key, search_key2, status, document,
               status_job_id, created_at, completed_at
        FROM migration.batch
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_part(pool: &DbPool, part_id: &str) -> AppResult<Option<BatchPartRow>> {
    let row = sqlx::query_as::<_, BatchPartRow>(
        r#"
        SELECT id, batch_id, scope_id, status, error, created_at, completed_at
        FROM migration.batch_part
        WHERE id = $1
        "#,
    )
    .bind(part_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn list_parts(pool: &DbPool, batch_id: &str) -> AppResult<Vec<BatchPartRow>> {
    let rows = sqlx::query_as::<_, BatchPartRow>(
        r#"
        SELECT id, batch_id, scope_id, status, error, created_at, completed_at
        FROM migration.batch_part
        WHERE batch_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn update_part_status(
    pool: &DbPool,
    part_id: &str,
    status: BatchPartStatus,
    error: Option<&str>,
) -> AppResult<u64> {
    let completed_at = status.is_terminal().then(Utc::now);
    let result = sqlx::query(
        r#"
        UPDATE migration.batch_part
        SET status = $2, error = $3, completed_at = $4
        WHERE id = $1
        "#,
    )
    .bind(part_id)
    .bind(status.as_str())
    .bind(error)
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn update_batch_status(pool: &DbPool, batch_id: &str, status: BatchStatus) -> AppResult<u64> {
    let completed_at = (status == BatchStatus::Completed).then(Utc::now);
    let result = sqlx::query(
        r#"
        UPDATE migration.batch
        SET status = $2, completed_at = $3
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .bind(status.as_str())
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn set_status_job(pool: &DbPool, batch_id: &str, job_id: &str) -> AppResult<u64> {
    let result = sqlx::query("UPDATE migration.batch SET status_job_id = $2 WHERE id = $1")
        .bind(batch_id)
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Delete a batch; its parts cascade.
pub async fn delete_batch(pool: &DbPool, batch_id: &str) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM migration.batch WHERE id = $1")
        .bind(batch_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}
