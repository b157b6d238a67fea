//! Process instance and execution queries.
//!
//! Writes take a connection so they can run inside the commit transaction.

use sqlx::PgConnection;

use crate::db::models::{ExecutionRow, InstanceRow};
use crate::db::DbPool;
use crate::error::AppResult;
use crate::runtime::InstanceState;

pub async fn get_instance(pool: &DbPool, instance_id: &str) -> AppResult<Option<InstanceRow>> {
    let row = sqlx::query_as::<_, InstanceRow>(
        r#"
        SELECT id, definition_id, tenant_id, parent_instance_id, super_execution_id,
               variables, revision
        FROM migration.process_instance
        WHERE id = $1
        "#,
    )
    .bind(instance_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_executions(pool: &DbPool, instance_id: &str) -> AppResult<Vec<ExecutionRow>> {
    let rows = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, process_instance_id, parent_id, activity_id, active, is_scope,
               multi_instance_root, sub_process_instance_id, local_variables,
               assignee, owner
        FROM migration.execution
        WHERE process_instance_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_instance_ids(pool: &DbPool, definition_id: &str) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM migration.process_instance
        WHERE definition_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(definition_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn find_sub_process_instance(
    pool: &DbPool,
    call_activity_execution_id: &str,
) -> AppResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM migration.process_instance
        WHERE super_execution_id = $1
        LIMIT 1
        "#,
    )
    .bind(call_activity_execution_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.0))
}

pub async fn insert_instance(conn: &mut PgConnection, instance: &InstanceState) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO migration.process_instance (
            id, definition_id, tenant_id, parent_instance_id, super_execution_id,
            variables, revision
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&instance.id)
    .bind(&instance.definition_id)
    .bind(&instance.tenant_id)
    .bind(&instance.parent_instance_id)
    .bind(&instance.super_execution_id)
    .bind(serde_json::Value::Object(instance.variables.clone()))
    .bind(instance.revision)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Update an instance read at `instance.revision`, bumping the revision.
/// Returns false when the stored revision differs.
pub async fn update_instance(conn: &mut PgConnection, instance: &InstanceState) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE migration.process_instance
        SET definition_id = $2,
            variables = $3,
            revision = revision + 1
        WHERE id = $1 AND revision = $4
        "#,
    )
    .bind(&instance.id)
    .bind(&instance.definition_id)
    .bind(serde_json::Value::Object(instance.variables.clone()))
    .bind(instance.revision)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete an instance read at `revision`; executions cascade.
/// Returns false when the stored revision differs.
pub async fn delete_instance(conn: &mut PgConnection, instance_id: &str, revision: i64) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM migration.process_instance
        WHERE id = $1 AND revision = $2
        "#,
    )
    .bind(instance_id)
    .bind(revision)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Replace the execution tree of an instance.
pub async fn replace_executions(conn: &mut PgConnection, instance: &InstanceState) -> AppResult<()> {
    sqlx::query("DELETE FROM migration.execution WHERE process_instance_id = $1")
        .bind(&instance.id)
        .execute(&mut *conn)
        .await?;

    for (position, execution) in instance.executions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO migration.execution (
                id, process_instance_id, parent_id, activity_id, active, is_scope,
                multi_instance_root, sub_process_instance_id, local_variables,
                assignee, owner, position
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&execution.id)
        .bind(&instance.id)
        .bind(&execution.parent_id)
        .bind(&execution.activity_id)
        .bind(execution.active)
        .bind(execution.is_scope)
        .bind(execution.multi_instance_root)
        .bind(&execution.sub_process_instance_id)
        .bind(serde_json::Value::Object(execution.local_variables.clone()))
        .bind(&execution.assignee)
        .bind(&execution.owner)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
