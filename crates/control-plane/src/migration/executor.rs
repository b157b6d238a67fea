//! Single-instance migration.
//!
//! Runs the phases of one instance migration over an in-memory copy of its
//! runtime snapshot:
//!
//! `Validate -> PreHook -> SwapDefinitionRef -> ApplyTransform ->
//! UpdateHistoryRefs -> PostHook -> Done`
//!
//! Nothing is written until every phase succeeded; the returned
//! [`PendingWrites`] are committed in one transaction by the caller.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::migration::applier::StateTransformApplier;
use crate::migration::context::MigrationContext;
use crate::migration::document::MigrationDocument;
use crate::migration::history::HistoryRecorder;
use crate::migration::hooks::HookInvoker;
use crate::migration::{planner, resolver, validator};
use crate::ports::PendingWrites;
use crate::runtime::RuntimeSnapshot;

/// Phases of an instance migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationPhase {
    Validate,
    PreHook,
    SwapDefinitionRef,
    ApplyTransform,
    UpdateHistoryRefs,
    PostHook,
    Done,
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MigrationPhase::Validate => "VALIDATE",
            MigrationPhase::PreHook => "PRE_HOOK",
            MigrationPhase::SwapDefinitionRef => "SWAP_DEFINITION_REF",
            MigrationPhase::ApplyTransform => "APPLY_TRANSFORM",
            MigrationPhase::UpdateHistoryRefs => "UPDATE_HISTORY_REFS",
            MigrationPhase::PostHook => "POST_HOOK",
            MigrationPhase::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

/// Applies one migration document to one instance.
#[derive(Clone)]
pub struct MigrationExecutor {
    applier: Arc<dyn StateTransformApplier>,
    hooks: Arc<HookInvoker>,
    history: HistoryRecorder,
}

impl MigrationExecutor {
    /// Create a new executor.
    pub fn new(
        applier: Arc<dyn StateTransformApplier>,
        hooks: Arc<HookInvoker>,
        history: HistoryRecorder,
    ) -> Self {
        Self {
            applier,
            hooks,
            history,
        }
    }

    /// Run every phase and return the writes of the migrated instance.
    pub fn execute(&self, ctx: &MigrationContext, doc: &MigrationDocument) -> AppResult<PendingWrites> {
        let instance_id = ctx.instance_id().to_string();
        let target_id = ctx.target().id.clone();
        let phase = |phase: MigrationPhase| {
            debug!(instance_id = %instance_id, definition_id = %target_id, phase = %phase, "Migration phase");
        };

        phase(MigrationPhase::Validate);
        let diagnostics = validator::validate(ctx, doc);
        if !diagnostics.is_empty() {
            let messages: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
            return Err(AppError::Migration(format!(
                "Process instance '{}' cannot be migrated: {}",
                instance_id,
                messages.join("; ")
            )));
        }
        let resolution = resolver::resolve(ctx, doc)?;
        let plan = planner::plan(&resolution);

        let mut snapshot: RuntimeSnapshot = ctx.snapshot.clone();

        phase(MigrationPhase::PreHook);
        if let Some(hook) = doc.pre_hook() {
            self.hooks.invoke(hook, &mut snapshot.root_mut().variables)?;
        }

        phase(MigrationPhase::SwapDefinitionRef);
        snapshot.root_mut().definition_id = target_id.clone();

        phase(MigrationPhase::ApplyTransform);
        let changes = self.applier.apply(ctx, &plan, &mut snapshot)?;
        apply_variables(&mut snapshot, doc);

        phase(MigrationPhase::UpdateHistoryRefs);
        let mut writes = PendingWrites {
            created_instance_ids: changes.created_instance_ids,
            ..PendingWrites::default()
        };
        self.history
            .update_definition_ref(&mut writes, &instance_id, &target_id);

        phase(MigrationPhase::PostHook);
        if let Some(hook) = doc.post_hook() {
            self.hooks.invoke(hook, &mut snapshot.root_mut().variables)?;
        }

        writes.removed_instances = changes
            .removed_instance_ids
            .iter()
            .filter_map(|id| ctx.snapshot.instance(id).map(|i| (id.clone(), i.revision)))
            .collect();
        writes.instances = snapshot
            .instances()
            .filter(|i| {
                i.id == instance_id
                    || writes.is_created(&i.id)
                    || ctx.snapshot.instance(&i.id) != Some(*i)
            })
            .cloned()
            .collect();

        phase(MigrationPhase::Done);
        Ok(writes)
    }
}

/// Document variables land after the transform: process variables on the
/// migrated instance, local variables on every active execution of their
/// activity.
fn apply_variables(snapshot: &mut RuntimeSnapshot, doc: &MigrationDocument) {
    snapshot
        .root_mut()
        .variables
        .extend(doc.process_variables().clone());

    if doc.activity_local_variables().is_empty() {
        return;
    }
    let ids: Vec<String> = snapshot.instances().map(|i| i.id.clone()).collect();
    for id in ids {
        let Some(instance) = snapshot.instance_mut(&id) else {
            continue;
        };
        for execution in instance.executions.iter_mut().filter(|e| e.active) {
            let Some(ref activity_id) = execution.activity_id else {
                continue;
            };
            if let Some(locals) = doc.activity_local_variables().get(activity_id) {
                execution.local_variables.extend(locals.clone());
            }
        }
    }
}
