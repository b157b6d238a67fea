//! In-memory persistence.
//!
//! [`MemoryStore`] implements every collaborator port over a shared map and
//! backs the test suites and single-node development without PostgreSQL.
//! Commits follow the same optimistic revision rules as the database store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::batch::{Batch, BatchPart, BatchPartStatus, BatchStatus};
use crate::error::{AppError, AppResult};
use crate::model::ProcessModel;
use crate::ports::{BatchRepository, HistoryRefUpdate, InstanceRepository, ModelProvider, PendingWrites};
use crate::runtime::InstanceState;

#[derive(Default)]
struct Inner {
    models: HashMap<String, Arc<ProcessModel>>,
    instances: HashMap<String, InstanceState>,
    history: Vec<HistoryRefUpdate>,
    batches: HashMap<String, Batch>,
    parts: Vec<BatchPart>,
}

/// Shared in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its id, or `key:version` when it has none.
    pub async fn deploy(&self, model: ProcessModel) -> String {
        let model = if model.id.is_empty() {
            let id = model.default_id();
            model.with_id(id)
        } else {
            model
        };
        let id = model.id.clone();
        self.inner.write().await.models.insert(id.clone(), Arc::new(model));
        id
    }

    pub async fn insert_instance(&self, instance: InstanceState) {
        self.inner
            .write()
            .await
            .instances
            .insert(instance.id.clone(), instance);
    }

    pub async fn instance(&self, instance_id: &str) -> Option<InstanceState> {
        self.inner.read().await.instances.get(instance_id).cloned()
    }

    /// Definition-ref updates of historical records, in commit order.
    pub async fn history_updates(&self) -> Vec<HistoryRefUpdate> {
        self.inner.read().await.history.clone()
    }

    /// Simulate a concurrent change of an instance.
    pub async fn bump_revision(&self, instance_id: &str) {
        if let Some(instance) = self.inner.write().await.instances.get_mut(instance_id) {
            instance.revision += 1;
        }
    }
}

fn conflict(instance_id: &str, read: i64, stored: i64) -> AppError {
    AppError::Conflict(format!(
        "process instance {} was modified concurrently (read revision {}, found {})",
        instance_id, read, stored
    ))
}

#[async_trait]
impl ModelProvider for MemoryStore {
    async fn get_model(&self, definition_id: &str) -> AppResult<Arc<ProcessModel>> {
        self.inner
            .read()
            .await
            .models
            .get(definition_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("process definition {}", definition_id)))
    }

    async fn find_model(
        &self,
        key: &str,
        version: Option<i32>,
        tenant_id: Option<&str>,
    ) -> AppResult<Option<Arc<ProcessModel>>> {
        let inner = self.inner.read().await;
        let found = inner
            .models
            .values()
            .filter(|m| m.key == key && m.tenant_id.as_deref() == tenant_id)
            .filter(|m| version.map_or(true, |v| m.version == v))
            .max_by_key(|m| m.version)
            .cloned();
        Ok(found)
    }
}

#[async_trait]
impl InstanceRepository for MemoryStore {
    async fn load_instance(&self, instance_id: &str) -> AppResult<InstanceState> {
        self.instance(instance_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("process instance {}", instance_id)))
    }

    async fn instance_ids_of_definition(&self, definition_id: &str) -> AppResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut ids: Vec<String> = inner
            .instances
            .values()
            .filter(|i| i.definition_id == definition_id)
            .map(|i| i.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn find_sub_process_instance(
        &self,
        call_activity_execution_id: &str,
    ) -> AppResult<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .instances
            .values()
            .find(|i| i.super_execution_id.as_deref() == Some(call_activity_execution_id))
            .map(|i| i.id.clone()))
    }

    async fn commit(&self, writes: &PendingWrites) -> AppResult<()> {
        let mut inner = self.inner.write().await;

        for instance in &writes.instances {
            let stored = inner.instances.get(&instance.id);
            match (writes.is_created(&instance.id), stored) {
                (true, Some(_)) => {
                    return Err(AppError::Conflict(format!(
                        "process instance {} already exists",
                        instance.id
                    )))
                }
                (false, None) => {
                    return Err(AppError::NotFound(format!("process instance {}", instance.id)))
                }
                (false, Some(stored)) if stored.revision != instance.revision => {
                    return Err(conflict(&instance.id, instance.revision, stored.revision));
                }
                _ => {}
            }
        }
        for (instance_id, revision) in &writes.removed_instances {
            if let Some(stored) = inner.instances.get(instance_id) {
                if stored.revision != *revision {
                    return Err(conflict(instance_id, *revision, stored.revision));
                }
            }
        }

        for instance in &writes.instances {
            let mut instance = instance.clone();
            if !writes.is_created(&instance.id) {
                instance.revision += 1;
            }
            inner.instances.insert(instance.id.clone(), instance);
        }
        for (instance_id, _) in &writes.removed_instances {
            inner.instances.remove(instance_id);
        }
        inner.history.extend(writes.history_refs.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl BatchRepository for MemoryStore {
    async fn create_batch(&self, batch: &Batch, parts: &[BatchPart]) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.batches.insert(batch.id.clone(), batch.clone());
        inner.parts.extend(parts.iter().cloned());
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> AppResult<Option<Batch>> {
        Ok(self.inner.read().await.batches.get(batch_id).cloned())
    }

    async fn get_part(&self, part_id: &str) -> AppResult<Option<BatchPart>> {
        let inner = self.inner.read().await;
        Ok(inner.parts.iter().find(|p| p.id == part_id).cloned())
    }

    async fn parts_of_batch(&self, batch_id: &str) -> AppResult<Vec<BatchPart>> {
        let inner = self.inner.read().await;
        Ok(inner
            .parts
            .iter()
            .filter(|p| p.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn update_part_status(
        &self,
        part_id: &str,
        status: BatchPartStatus,
        error: Option<&str>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let part = inner
            .parts
            .iter_mut()
            .find(|p| p.id == part_id)
            .ok_or_else(|| AppError::NotFound(format!("batch part {}", part_id)))?;
        part.status = status;
        part.error = error.map(str::to_string);
        part.completed_at = status.is_terminal().then(Utc::now);
        Ok(())
    }

    async fn update_batch_status(&self, batch_id: &str, status: BatchStatus) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let batch = inner
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| AppError::NotFound(format!("batch {}", batch_id)))?;
        batch.status = status;
        batch.completed_at = (status == BatchStatus::Completed).then(Utc::now);
        Ok(())
    }

    async fn set_status_job(&self, batch_id: &str, job_id: &str) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let batch = inner
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| AppError::NotFound(format!("batch {}", batch_id)))?;
        batch.status_job_id = Some(job_id.to_string());
        Ok(())
    }

    async fn delete_batch(&self, batch_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        inner.parts.retain(|p| p.batch_id != batch_id);
        Ok(inner.batches.remove(batch_id).is_some())
    }
}
