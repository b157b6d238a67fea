//! Process definition queries.

use crate::db::models::DefinitionRow;
use crate::db::DbPool;
use crate::error::AppResult;

pub async fn get_definition(pool: &DbPool, definition_id: &str) -> AppResult<Option<DefinitionRow>> {
    let row = sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT id, key, version, tenant_id, model, created_at
        FROM migration.process_definition
        WHERE id = $1
        "#,
    )
    .bind(definition_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Definition of a key within a tenant; the latest version when `version` is `None`.
pub async fn find_definition(
    pool: &DbPool,
    key: &str,
    version: Option<i32>,
    tenant_id: Option<&str>,
) -> AppResult<Option<DefinitionRow>> {
    let row = sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT id, key, version, tenant_id, model, created_at
        FROM migration.process_definition
        WHERE key = $1
          AND tenant_id IS NOT DISTINCT FROM $2
          AND ($3::INTEGER IS NULL OR version = $3)
        ORDER BY version DESC
        LIMIT 1
        "#,
    )
    .bind(key)
    .bind(tenant_id)
    .bind(version)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
