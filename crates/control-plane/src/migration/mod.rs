//! Live process-instance migration.
//!
//! One instance migration flows through
//! validator -> resolver -> planner -> executor:
//! - [`validator`] classifies a document against the running executions
//! - [`resolver`] decides exactly one mapping per running execution
//! - [`planner`] turns decisions into scoped move operations
//! - [`executor`] applies the plan phase by phase
//!
//! [`manager::InstanceMigrator`] exposes the synchronous operations; batch
//! migration lives in [`crate::batch`].

pub mod applier;
pub mod context;
pub mod diagnostic;
pub mod document;
pub mod executor;
pub mod history;
pub mod hooks;
pub mod json;
pub mod manager;
pub mod planner;
pub mod resolver;
pub mod rules;
pub mod validator;

#[cfg(test)]
mod fixtures;

pub use applier::{ExecutionTreeApplier, StateTransformApplier, TreeChanges};
pub use context::{MigrationContext, ModelResolver, ModelSet};
pub use diagnostic::Diagnostic;
pub use document::{
    ActivityMigrationMapping, CallActivityTarget, DefinitionTarget, EnableActivityMapping,
    MappingKind, MigrationDocument, MigrationDocumentBuilder, MigrationHook,
};
pub use executor::{MigrationExecutor, MigrationPhase};
pub use history::{HistoryLevel, HistoryRecorder};
pub use hooks::{DelegateRegistry, HookInvoker, MigrationDelegate};
pub use manager::InstanceMigrator;
pub use planner::{MoveKind, MoveOperation, ScopedPlan, TransformPlan};
pub use resolver::{CallActivityEntry, MappingScope, MappingSource, Resolution, ResolvedMapping};
pub use validator::validate;
