//! PostgreSQL implementation of the collaborator ports.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::batch::{Batch, BatchPart, BatchPartStatus, BatchStatus};
use crate::db::queries::{batch, definition, history, instance};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::model::ProcessModel;
use crate::ports::{BatchRepository, InstanceRepository, ModelProvider, PendingWrites};
use crate::runtime::InstanceState;

/// Store over the `migration` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn conflict(instance_id: &str, revision: i64) -> AppError {
    AppError::Conflict(format!(
        "process instance {} was modified concurrently (read revision {})",
        instance_id, revision
    ))
}

#[async_trait]
impl ModelProvider for PgStore {
    async fn get_model(&self, definition_id: &str) -> AppResult<Arc<ProcessModel>> {
        let row = definition::get_definition(&self.pool, definition_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("process definition {}", definition_id)))?;
        Ok(Arc::new(row.into_model()?))
    }

    async fn find_model(
        &self,
        key: &str,
        version: Option<i32>,
        tenant_id: Option<&str>,
    ) -> AppResult<Option<Arc<ProcessModel>>> {
        match definition::find_definition(&self.pool, key, version, tenant_id).await? {
            Some(row) => Ok(Some(Arc::new(row.into_model()?))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl InstanceRepository for PgStore {
    async fn load_instance(&self, instance_id: &str) -> AppResult<InstanceState> {
        let row = instance::get_instance(&self.pool, instance_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("process instance {}", instance_id)))?;
        let executions = instance::get_executions(&self.pool, instance_id).await?;
        Ok(row.into_state(executions))
    }

    async fn instance_ids_of_definition(&self, definition_id: &str) -> AppResult<Vec<String>> {
        instance::list_instance_ids(&self.pool, definition_id).await
    }

    async fn find_sub_process_instance(
        &self,
        call_activity_execution_id: &str,
    ) -> AppResult<Option<String>> {
        instance::find_sub_process_instance(&self.pool, call_activity_execution_id).await
    }

    async fn commit(&self, writes: &PendingWrites) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Created sub-process instances first so that callers may reference them
        for state in writes.instances.iter().filter(|i| writes.is_created(&i.id)) {
            instance::insert_instance(&mut tx, state).await?;
            instance::replace_executions(&mut tx, state).await?;
        }
        for state in writes.instances.iter().filter(|i| !writes.is_created(&i.id)) {
            if !instance::update_instance(&mut tx, state).await? {
                return Err(conflict(&state.id, state.revision));
            }
            instance::replace_executions(&mut tx, state).await?;
        }
        for (instance_id, revision) in &writes.removed_instances {
            if !instance::delete_instance(&mut tx, instance_id, *revision).await? {
                return Err(conflict(instance_id, *revision));
            }
        }
        for update in &writes.history_refs {
            let rows =
                history::update_definition_ref(&mut tx, &update.instance_id, &update.definition_id)
                    .await?;
            debug!(
                instance_id = %update.instance_id,
                definition_id = %update.definition_id,
                rows,
                "Updated historic definition refs"
            );
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl BatchRepository for PgStore {
    async fn create_batch(&self, batch: &Batch, parts: &[BatchPart]) -> AppResult<()> {
        batch::insert_batch(&self.pool, batch, parts).await
    }

    async fn get_batch(&self, batch_id: &str) -> AppResult<Option<Batch>> {
        batch::get_batch(&self.pool, batch_id)
            .await?
            .map(Batch::try_from)
            .transpose()
    }

    async fn get_part(&self, part_id: &str) -> AppResult<Option<BatchPart>> {
        batch::get_part(&self.pool, part_id)
            .await?
            .map(BatchPart::try_from)
            .transpose()
    }

    async fn parts_of_batch(&self, batch_id: &str) -> AppResult<Vec<BatchPart>> {
        batch::list_parts(&self.pool, batch_id)
            .await?
            .into_iter()
            .map(BatchPart::try_from)
            .collect()
    }

    async fn update_part_status(
        &self,
        part_id: &str,
        status: BatchPartStatus,
        error: Option<&str>,
    ) -> AppResult<()> {
        match batch::update_part_status(&self.pool, part_id, status, error).await? {
            0 => Err(AppError::NotFound(format!("batch part {}", part_id))),
            _ => Ok(()),
        }
    }

    async fn update_batch_status(&self, batch_id: &str, status: BatchStatus) -> AppResult<()> {
        match batch::update_batch_status(&self.pool, batch_id, status).await? {
            0 => Err(AppError::NotFound(format!("batch {}", batch_id))),
            _ => Ok(()),
        }
    }

    async fn set_status_job(&self, batch_id: &str, job_id: &str) -> AppResult<()> {
        match batch::set_status_job(&self.pool, batch_id, job_id).await? {
            0 => Err(AppError::NotFound(format!("batch {}", batch_id))),
            _ => Ok(()),
        }
    }

    async fn delete_batch(&self, batch_id: &str) -> AppResult<bool> {
        batch::delete_batch(&self.pool, batch_id).await
    }
}
