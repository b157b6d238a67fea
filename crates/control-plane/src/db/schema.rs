//! Schema management.

use crate::db::DbPool;
use crate::error::AppResult;

/// DDL of the `migration` schema; every statement is idempotent.
pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub const SCHEMA_NAME: &str = "migration";

/// Tables the control plane reads or writes.
pub const REQUIRED_TABLES: &[&str] = &[
    "process_definition",
    "process_instance",
    "execution",
    "batch",
    "batch_part",
    "hist_process_instance",
    "hist_activity_instance",
    "hist_task_instance",
];

/// Create the schema and its tables when missing.
pub async fn init_schema(pool: &DbPool) -> AppResult<()> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    tracing::info!(schema = SCHEMA_NAME, "Database schema initialized");
    Ok(())
}

/// Required tables missing from the database.
pub async fn missing_tables(pool: &DbPool) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1",
    )
    .bind(SCHEMA_NAME)
    .fetch_all(pool)
    .await?;

    let found: Vec<String> = rows.into_iter().map(|r| r.0).collect();
    Ok(REQUIRED_TABLES
        .iter()
        .filter(|t| !found.iter().any(|f| f == *t))
        .map(|t| t.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creates_every_required_table() {
        for table in REQUIRED_TABLES {
            let ddl = format!("CREATE TABLE IF NOT EXISTS migration.{} (", table);
            assert!(SCHEMA_SQL.contains(&ddl), "missing DDL for {}", table);
        }
    }
}
