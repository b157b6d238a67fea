//! Collaborator interfaces consumed by the migration engine.
//!
//! Persistence is reached only through these traits, so the engine runs
//! unchanged against PostgreSQL ([`crate::db::PgStore`]) or the in-memory
//! store ([`crate::memory::MemoryStore`]).

use async_trait::async_trait;
use std::sync::Arc;

use crate::batch::{Batch, BatchPart, BatchPartStatus, BatchStatus};
use crate::error::AppResult;
use crate::model::ProcessModel;
use crate::runtime::InstanceState;

/// Looks up process graphs.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Model of a definition id; `NotFound` when absent.
    async fn get_model(&self, definition_id: &str) -> AppResult<Arc<ProcessModel>>;

    /// Model by key within a tenant, latest version when `version` is `None`.
    async fn find_model(
        &self,
        key: &str,
        version: Option<i32>,
        tenant_id: Option<&str>,
    ) -> AppResult<Option<Arc<ProcessModel>>>;
}

/// Definition-ref update of historical records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRefUpdate {
    pub instance_id: String,
    pub definition_id: String,
}

/// Everything one instance migration writes, committed atomically.
#[derive(Debug, Clone, Default)]
pub struct PendingWrites {
    /// Changed and created instances; `revision` holds the value read
    pub instances: Vec<InstanceState>,
    pub created_instance_ids: Vec<String>,
    /// Removed sub-process instances with the revision read
    pub removed_instances: Vec<(String, i64)>,
    pub history_refs: Vec<HistoryRefUpdate>,
}

impl PendingWrites {
    pub fn is_created(&self, instance_id: &str) -> bool {
        self.created_instance_ids.iter().any(|id| id == instance_id)
    }
}

/// Reads and writes live process instances.
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// One instance with its execution tree; `NotFound` when absent.
    async fn load_instance(&self, instance_id: &str) -> AppResult<InstanceState>;

    /// Ids of all instances running the definition.
    async fn instance_ids_of_definition(&self, definition_id: &str) -> AppResult<Vec<String>>;

    /// Instance started by a call activity execution.
    async fn find_sub_process_instance(
        &self,
        call_activity_execution_id: &str,
    ) -> AppResult<Option<String>>;

    /// Apply all writes in one transaction. Fails with `Conflict` when any
    /// touched instance changed since it was read.
    async fn commit(&self, writes: &PendingWrites) -> AppResult<()>;
}

/// Stores batches and their parts.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn create_batch(&self, batch: &Batch, parts: &[BatchPart]) -> AppResult<()>;

    async fn get_batch(&self, batch_id: &str) -> AppResult<Option<Batch>>;

    async fn get_part(&self, part_id: &str) -> AppResult<Option<BatchPart>>;

    async fn parts_of_batch(&self, batch_id: &str) -> AppResult<Vec<BatchPart>>;

    async fn update_part_status(
        &self,
        part_id: &str,
        status: BatchPartStatus,
        error: Option<&str>,
    ) -> AppResult<()>;

    /// Set the status and, once completed, the completion time.
    async fn update_batch_status(&self, batch_id: &str, status: BatchStatus) -> AppResult<()>;

    async fn set_status_job(&self, batch_id: &str, job_id: &str) -> AppResult<()>;

    /// Remove a batch with its parts; false when it did not exist.
    async fn delete_batch(&self, batch_id: &str) -> AppResult<bool>;
}
