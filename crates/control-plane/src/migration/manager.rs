//! Instance migration entry points.
//!
//! [`InstanceMigrator`] wires the model resolver, the executor and the
//! instance repository into the synchronous operations:
//! - validate one instance, or every instance of a definition
//! - migrate one instance, or every instance of a definition in sequence

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::expression::ExpressionEvaluator;
use crate::migration::context::ModelResolver;
use crate::migration::diagnostic::Diagnostic;
use crate::migration::document::MigrationDocument;
use crate::migration::executor::MigrationExecutor;
use crate::migration::hooks::HookInvoker;
use crate::migration::validator;
use crate::model::ProcessModel;
use crate::ports::{InstanceRepository, ModelProvider};
use crate::result_ext::ResultExt;

/// Validates and migrates live process instances.
#[derive(Clone)]
pub struct InstanceMigrator {
    models: Arc<dyn ModelProvider>,
    instances: Arc<dyn InstanceRepository>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    hooks: Arc<HookInvoker>,
    executor: MigrationExecutor,
}

impl InstanceMigrator {
    /// Create a new instance migrator.
    pub fn new(
        models: Arc<dyn ModelProvider>,
        instances: Arc<dyn InstanceRepository>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        hooks: Arc<HookInvoker>,
        executor: MigrationExecutor,
    ) -> Self {
        Self {
            models,
            instances,
            evaluator,
            hooks,
            executor,
        }
    }

    fn resolver(&self) -> ModelResolver<'_> {
        ModelResolver::new(self.models.as_ref(), self.instances.as_ref(), self.evaluator.as_ref())
    }

    /// Fail with `Config` when the document's hooks cannot be resolved.
    pub fn check_document(&self, doc: &MigrationDocument) -> AppResult<()> {
        self.hooks.check(doc)
    }

    pub async fn model(&self, definition_id: &str) -> AppResult<Arc<ProcessModel>> {
        self.models.get_model(definition_id).await
    }

    /// Resolve the document's target definition, failing when it does not exist.
    pub async fn resolve_target(&self, doc: &MigrationDocument) -> AppResult<Arc<ProcessModel>> {
        self.resolver().resolve_target(doc.target()).await
    }

    /// Instances of a definition a document applies to.
    pub async fn instances_of(&self, definition_id: &str, doc: &MigrationDocument) -> AppResult<Vec<String>> {
        let mut ids = self.instances.instance_ids_of_definition(definition_id).await?;
        if !doc.instance_ids().is_empty() {
            ids.retain(|id| doc.instance_ids().contains(id));
        }
        Ok(ids)
    }

    /// Validate the document against one instance.
    pub async fn validate_instance(&self, instance_id: &str, doc: &MigrationDocument) -> AppResult<Vec<Diagnostic>> {
        let target = self.resolve_target(doc).await?;
        self.validate_with_target(instance_id, doc, target).await
    }

    async fn validate_with_target(
        &self,
        instance_id: &str,
        doc: &MigrationDocument,
        target: Arc<ProcessModel>,
    ) -> AppResult<Vec<Diagnostic>> {
        let ctx = self.resolver().build(instance_id, doc, target).await?;
        Ok(validator::validate(&ctx, doc))
    }

    /// Validate the document against every instance of a definition.
    /// Messages are prefixed with the instance they belong to.
    pub async fn validate_definition(&self, definition_id: &str, doc: &MigrationDocument) -> AppResult<Vec<Diagnostic>> {
        let target = self.resolve_target(doc).await?;
        let mut diagnostics = Vec::new();
        for instance_id in self.instances_of(definition_id, doc).await? {
            let found = self
                .validate_with_target(&instance_id, doc, target.clone())
                .await?;
            diagnostics.extend(found.into_iter().map(Diagnostic::with_instance_prefix));
        }
        Ok(diagnostics)
    }

    /// Migrate one instance. Fails on any diagnostic or execution error;
    /// nothing is written unless every phase succeeded.
    pub async fn migrate_instance(&self, instance_id: &str, doc: &MigrationDocument) -> AppResult<()> {
        self.hooks.check(doc)?;
        let target = self.resolve_target(doc).await?;
        self.migrate_with_target(instance_id, doc, target).await
    }

    /// Migrate one instance to an already resolved target.
    pub async fn migrate_with_target(
        &self,
        instance_id: &str,
        doc: &MigrationDocument,
        target: Arc<ProcessModel>,
    ) -> AppResult<()> {
        let ctx = self.resolver().build(instance_id, doc, target).await?;
        let source_definition = ctx.instance().definition_id.clone();
        let writes = self.executor.execute(&ctx, doc)?;
        self.instances
            .commit(&writes)
            .await
            .log_warn(format!("committing migration of instance {}", instance_id))?;

        info!(
            instance_id = %instance_id,
            from_definition = %source_definition,
            definition_id = %ctx.target().id,
            "Migrated process instance"
        );
        Ok(())
    }

    /// Migrate every instance of a definition, one after another. Stops at
    /// the first failing instance; instances migrated before it stay migrated.
    pub async fn migrate_definition(&self, definition_id: &str, doc: &MigrationDocument) -> AppResult<usize> {
        self.hooks.check(doc)?;
        let target = self.resolve_target(doc).await?;
        let instance_ids = self.instances_of(definition_id, doc).await?;
        for instance_id in &instance_ids {
            if let Err(e) = self.migrate_with_target(instance_id, doc, target.clone()).await {
                warn!(instance_id = %instance_id, definition_id = %definition_id, error = %e, "Instance migration failed");
                return Err(e);
            }
        }
        Ok(instance_ids.len())
    }
}
