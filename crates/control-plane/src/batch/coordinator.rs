//! Batch migration.
//!
//! A batch fans a migration document out to one job per instance of the
//! source definition plus one recurring status job. Jobs carry only ids;
//! each part job migrates exactly its own instance and settles exactly its
//! own part, so one failing instance never affects another.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::job::{JobMessage, JobOutcome};
use crate::batch::scheduler::JobScheduler;
use crate::batch::types::{
    derive_batch_status, Batch, BatchMigrationResult, BatchPart, BatchPartStatus, BatchStatus,
    MIGRATION_BATCH_TYPE,
};
use crate::error::{AppError, AppResult};
use crate::migration::{InstanceMigrator, MigrationDocument};
use crate::ports::BatchRepository;

/// Creates batches and executes their jobs.
#[derive(Clone)]
pub struct BatchMigrationCoordinator {
    migrator: InstanceMigrator,
    batches: Arc<dyn BatchRepository>,
    scheduler: Arc<dyn JobScheduler>,
    status_cycle: Duration,
}

impl BatchMigrationCoordinator {
    pub fn new(
        migrator: InstanceMigrator,
        batches: Arc<dyn BatchRepository>,
        scheduler: Arc<dyn JobScheduler>,
        status_cycle: Duration,
    ) -> Self {
        Self {
            migrator,
            batches,
            scheduler,
            status_cycle,
        }
    }

    /// Start migrating every instance of `definition_id`.
    ///
    /// The target definition is resolved before anything is created, so a
    /// missing target fails without leaving a batch behind.
    pub async fn batch_migrate(&self, definition_id: &str, doc: &MigrationDocument) -> AppResult<Batch> {
        self.migrator.check_document(doc)?;
        let target = self.migrator.resolve_target(doc).await?;
        let instance_ids = self.migrator.instances_of(definition_id, doc).await?;

        let mut batch = Batch {
            id: Uuid::new_v4().to_string(),
            batch_type: MIGRATION_BATCH_TYPE.to_string(),
            search_key: definition_id.to_string(),
            search_key2: target.id.clone(),
            status: BatchStatus::InProgress,
            document: serde_json::to_value(doc)?,
            status_job_id: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let parts: Vec<BatchPart> = instance_ids
            .iter()
            .map(|instance_id| BatchPart::waiting(&batch.id, instance_id))
            .collect();
        self.batches.create_batch(&batch, &parts).await?;

        for part in &parts {
            self.scheduler
                .schedule_once(JobMessage::migrate_part(&part.id))
                .await?;
        }
        let job_id = self
            .scheduler
            .schedule_recurring(JobMessage::batch_status(&batch.id), self.status_cycle)
            .await?;
        self.batches.set_status_job(&batch.id, &job_id).await?;
        batch.status_job_id = Some(job_id);

        info!(
            batch_id = %batch.id,
            definition_id = %definition_id,
            target_definition_id = %target.id,
            parts = parts.len(),
            "Created migration batch"
        );
        Ok(batch)
    }

    /// Execute one job message. Errors of the job itself are turned into
    /// outcomes: retryable ones ask for a retry, all others settle the part.
    pub async fn execute_job(&self, message: &JobMessage) -> JobOutcome {
        let result = match message {
            JobMessage::MigratePart { batch_part_id } => self.run_part(batch_part_id).await,
            JobMessage::BatchStatus { batch_id } => self.run_status(batch_id).await,
        };
        result.unwrap_or_else(|e| JobOutcome::Retry {
            reason: e.to_string(),
        })
    }

    async fn run_part(&self, part_id: &str) -> AppResult<JobOutcome> {
        let Some(part) = self.batches.get_part(part_id).await? else {
            debug!(batch_part_id = %part_id, "Batch part no longer exists");
            return Ok(JobOutcome::Done);
        };
        if part.status.is_terminal() {
            return Ok(JobOutcome::Done);
        }
        let Some(batch) = self.batches.get_batch(&part.batch_id).await? else {
            return Ok(JobOutcome::Done);
        };

        self.batches
            .update_part_status(part_id, BatchPartStatus::InProgress, None)
            .await?;

        let outcome = match self.migrate_part(&batch, &part).await {
            Ok(()) => {
                self.batches
                    .update_part_status(part_id, BatchPartStatus::Completed, None)
                    .await?;
                debug!(batch_id = %batch.id, batch_part_id = %part_id, "Batch part completed");
                JobOutcome::Done
            }
            Err(e) if e.is_retryable() => JobOutcome::Retry {
                reason: e.to_string(),
            },
            Err(e) => {
                warn!(
                    batch_id = %batch.id,
                    batch_part_id = %part_id,
                    instance_id = %part.scope_id,
                    error = %e,
                    "Batch part failed"
                );
                self.batches
                    .update_part_status(part_id, BatchPartStatus::Failed, Some(&e.to_string()))
                    .await?;
                JobOutcome::Done
            }
        };
        Ok(outcome)
    }

    async fn migrate_part(&self, batch: &Batch, part: &BatchPart) -> AppResult<()> {
        let doc: MigrationDocument = serde_json::from_value(batch.document.clone())?;
        let target = self.migrator.model(&batch.search_key2).await?;
        self.migrator
            .migrate_with_target(&part.scope_id, &doc, target)
            .await
    }

    async fn run_status(&self, batch_id: &str) -> AppResult<JobOutcome> {
        match self.settle_status(batch_id).await? {
            Some(BatchStatus::InProgress) => Ok(JobOutcome::Reschedule {
                delay_ms: self.status_cycle.as_millis() as u64,
            }),
            _ => Ok(JobOutcome::Done),
        }
    }

    /// Store the status derived from the parts of `batch_id` and return it,
    /// or `None` when the batch no longer exists.
    async fn settle_status(&self, batch_id: &str) -> AppResult<Option<BatchStatus>> {
        let Some(batch) = self.batches.get_batch(batch_id).await? else {
            debug!(batch_id = %batch_id, "Batch no longer exists");
            return Ok(None);
        };
        let parts = self.batches.parts_of_batch(batch_id).await?;
        let status = derive_batch_status(&parts);
        if status != batch.status {
            self.batches.update_batch_status(batch_id, status).await?;
        }

        if status == BatchStatus::Completed {
            let failed = parts
                .iter()
                .filter(|p| p.status == BatchPartStatus::Failed)
                .count();
            info!(batch_id = %batch_id, parts = parts.len(), failed, "Migration batch completed");
        }
        Ok(Some(status))
    }

    /// Give up on a job that exhausted its retries.
    ///
    /// A part job settles its part as failed. A status job settles the batch
    /// when every part is terminal and otherwise schedules a fresh status job,
    /// so a batch always reaches its terminal status.
    pub async fn dead_letter(&self, message: &JobMessage, reason: &str) -> AppResult<()> {
        match message {
            JobMessage::MigratePart { batch_part_id } => {
                let Some(part) = self.batches.get_part(batch_part_id).await? else {
                    return Ok(());
                };
                if !part.status.is_terminal() {
                    self.batches
                        .update_part_status(batch_part_id, BatchPartStatus::Failed, Some(reason))
                        .await?;
                }
                warn!(batch_part_id = %batch_part_id, reason = %reason, "Batch part dead-lettered");
            }
            JobMessage::BatchStatus { batch_id } => {
                warn!(batch_id = %batch_id, reason = %reason, "Batch status job dead-lettered");
                if self.settle_status(batch_id).await? == Some(BatchStatus::InProgress) {
                    let job_id = self
                        .scheduler
                        .schedule_recurring(JobMessage::batch_status(batch_id), self.status_cycle)
                        .await?;
                    self.batches.set_status_job(batch_id, &job_id).await?;
                    info!(batch_id = %batch_id, job_id = %job_id, "Re-armed batch status job");
                }
            }
        }
        Ok(())
    }

    pub async fn batch_result(&self, batch_id: &str) -> AppResult<BatchMigrationResult> {
        let batch = self.get_batch(batch_id).await?;
        let parts = self.batches.parts_of_batch(batch_id).await?;
        Ok(BatchMigrationResult::new(&batch, &parts))
    }

    /// Delete a batch and its parts. Pending part jobs become no-ops; a job
    /// already running is not interrupted.
    pub async fn delete_batch(&self, batch_id: &str) -> AppResult<()> {
        let batch = self.get_batch(batch_id).await?;
        if let Some(ref job_id) = batch.status_job_id {
            self.scheduler.delete(job_id).await?;
        }
        self.batches.delete_batch(batch_id).await?;
        info!(batch_id = %batch_id, "Deleted migration batch");
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> AppResult<Batch> {
        self.batches
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch {}", batch_id)))
    }
}
