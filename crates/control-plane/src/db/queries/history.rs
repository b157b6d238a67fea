//! Historical record queries.

use sqlx::PgConnection;

use crate::error::AppResult;

/// Point the historical records of an instance at a new definition.
/// Returns the number of rows updated.
pub async fn update_definition_ref(
    conn: &mut PgConnection,
    instance_id: &str,
    definition_id: &str,
) -> AppResult<u64> {
    let mut updated = sqlx::query(
        "UPDATE migration.hist_process_instance SET definition_id = $2 WHERE id = $1",
    )
    .bind(instance_id)
    .bind(definition_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    for table in ["hist_activity_instance", "hist_task_instance"] {
        updated += sqlx::query(&format!(
            "UPDATE migration.{} SET definition_id = $2 WHERE process_instance_id = $1",
            table
        ))
        .bind(instance_id)
        .bind(definition_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }

    Ok(updated)
}
