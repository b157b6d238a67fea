//! Migration service.
//!
//! Facade over the synchronous instance migrator and the batch coordinator,
//! assembled from the collaborator ports. Handlers, the in-process job
//! runner and the tests all go through it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::{Batch, BatchMigrationCoordinator, BatchMigrationResult, JobHandler, JobMessage, JobOutcome, JobScheduler};
use crate::error::AppResult;
use crate::expression::{ExpressionEvaluator, TemplateEvaluator};
use crate::migration::{
    DelegateRegistry, Diagnostic, ExecutionTreeApplier, HistoryLevel, HistoryRecorder, HookInvoker,
    InstanceMigrator, MigrationDocument, MigrationExecutor,
};
use crate::ports::{BatchRepository, InstanceRepository, ModelProvider};

/// Engine settings taken from the application config.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub history_level: HistoryLevel,
    pub batch_status_cycle: Duration,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            history_level: HistoryLevel::default(),
            batch_status_cycle: Duration::from_secs(10),
        }
    }
}

/// Service for migration operations.
#[derive(Clone)]
pub struct MigrationService {
    migrator: InstanceMigrator,
    coordinator: BatchMigrationCoordinator,
}

impl MigrationService {
    /// Create a new migration service.
    pub fn new(
        models: Arc<dyn ModelProvider>,
        instances: Arc<dyn InstanceRepository>,
        batches: Arc<dyn BatchRepository>,
        scheduler: Arc<dyn JobScheduler>,
        delegates: DelegateRegistry,
        settings: MigrationSettings,
    ) -> Self {
        let evaluator: Arc<dyn ExpressionEvaluator> = Arc::new(TemplateEvaluator::new());
        let hooks = Arc::new(HookInvoker::new(delegates, evaluator.clone()));
        let applier = Arc::new(ExecutionTreeApplier::new(evaluator.clone()));
        let executor = MigrationExecutor::new(
            applier,
            hooks.clone(),
            HistoryRecorder::new(settings.history_level),
        );
        let migrator = InstanceMigrator::new(models, instances, evaluator, hooks, executor);
        let coordinator = BatchMigrationCoordinator::new(
            migrator.clone(),
            batches,
            scheduler,
            settings.batch_status_cycle,
        );

        Self {
            migrator,
            coordinator,
        }
    }

    /// Create a service whose ports are all backed by one store.
    pub fn with_store<S>(
        store: S,
        scheduler: Arc<dyn JobScheduler>,
        delegates: DelegateRegistry,
        settings: MigrationSettings,
    ) -> Self
    where
        S: ModelProvider + InstanceRepository + BatchRepository + Clone + 'static,
    {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            scheduler,
            delegates,
            settings,
        )
    }

    pub async fn validate_instance(&self, instance_id: &str, doc: &MigrationDocument) -> AppResult<Vec<Diagnostic>> {
        self.migrator.validate_instance(instance_id, doc).await
    }

    pub async fn validate_definition(&self, definition_id: &str, doc: &MigrationDocument) -> AppResult<Vec<Diagnostic>> {
        self.migrator.validate_definition(definition_id, doc).await
    }

    pub async fn migrate_instance(&self, instance_id: &str, doc: &MigrationDocument) -> AppResult<()> {
        self.migrator.migrate_instance(instance_id, doc).await
    }

    /// Migrate every instance of a definition in sequence; returns how many were migrated.
    pub async fn migrate_definition(&self, definition_id: &str, doc: &MigrationDocument) -> AppResult<usize> {
        self.migrator.migrate_definition(definition_id, doc).await
    }

    pub async fn batch_migrate(&self, definition_id: &str, doc: &MigrationDocument) -> AppResult<Batch> {
        self.coordinator.batch_migrate(definition_id, doc).await
    }

    pub async fn batch_result(&self, batch_id: &str) -> AppResult<BatchMigrationResult> {
        self.coordinator.batch_result(batch_id).await
    }

    pub async fn delete_batch(&self, batch_id: &str) -> AppResult<()> {
        self.coordinator.delete_batch(batch_id).await
    }

    pub async fn execute_job(&self, message: &JobMessage) -> JobOutcome {
        self.coordinator.execute_job(message).await
    }

    pub async fn dead_letter(&self, message: &JobMessage, reason: &str) -> AppResult<()> {
        self.coordinator.dead_letter(message, reason).await
    }
}

#[async_trait]
impl JobHandler for MigrationService {
    async fn execute(&self, message: &JobMessage) -> JobOutcome {
        self.execute_job(message).await
    }

    async fn dead_letter(&self, message: &JobMessage, reason: &str) -> AppResult<()> {
        self.coordinator.dead_letter(message, reason).await
    }
}
