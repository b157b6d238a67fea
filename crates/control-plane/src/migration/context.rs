//! Model resolution.
//!
//! Gathers everything one instance migration reads: the runtime snapshot
//! (the instance and its sub-process instances), the current and target
//! models, and the process definitions called by the target's call
//! activities. Validation, resolution and planning then run as pure
//! functions over the resulting [`MigrationContext`].

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::expression::{is_expression, ExpressionEvaluator};
use crate::migration::document::{DefinitionTarget, MigrationDocument};
use crate::model::ProcessModel;
use crate::ports::{InstanceRepository, ModelProvider};
use crate::runtime::{InstanceState, RuntimeSnapshot};

/// Models one migration works with, keyed by definition id.
#[derive(Debug, Clone)]
pub struct ModelSet {
    current_id: String,
    target_id: String,
    models: HashMap<String, Arc<ProcessModel>>,
}

impl ModelSet {
    pub fn new(current: Arc<ProcessModel>, target: Arc<ProcessModel>) -> Self {
        let mut models = HashMap::new();
        let current_id = current.id.clone();
        let target_id = target.id.clone();
        models.insert(current_id.clone(), current);
        models.insert(target_id.clone(), target);
        Self {
            current_id,
            target_id,
            models,
        }
    }

    pub fn add(&mut self, model: Arc<ProcessModel>) {
        self.models.entry(model.id.clone()).or_insert(model);
    }

    pub fn current(&self) -> &ProcessModel {
        &self.models[&self.current_id]
    }

    pub fn target(&self) -> &ProcessModel {
        &self.models[&self.target_id]
    }

    pub fn get(&self, definition_id: &str) -> Option<&ProcessModel> {
        self.models.get(definition_id).map(Arc::as_ref)
    }

    pub fn contains(&self, definition_id: &str) -> bool {
        self.models.contains_key(definition_id)
    }
}

/// Read-side input of one instance migration.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub snapshot: RuntimeSnapshot,
    pub models: ModelSet,
    /// Target call activity id to the definition it calls, or why it cannot be found
    called_definitions: HashMap<String, Result<String, String>>,
    /// Instance variables over the document's process variables
    scope: Map<String, Value>,
}

impl MigrationContext {
    pub fn new(
        snapshot: RuntimeSnapshot,
        models: ModelSet,
        called_definitions: HashMap<String, Result<String, String>>,
        process_variables: &Map<String, Value>,
    ) -> Self {
        let mut scope = process_variables.clone();
        scope.extend(snapshot.root().variables.clone());
        Self {
            snapshot,
            models,
            called_definitions,
            scope,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.snapshot.root().id
    }

    pub fn instance(&self) -> &InstanceState {
        self.snapshot.root()
    }

    pub fn current(&self) -> &ProcessModel {
        self.models.current()
    }

    pub fn target(&self) -> &ProcessModel {
        self.models.target()
    }

    /// Variables expressions are evaluated against.
    pub fn scope(&self) -> &Map<String, Value> {
        &self.scope
    }

    /// Model of the definition called by a call activity of the target model.
    pub fn called_model(&self, call_activity_id: &str) -> Result<&ProcessModel, String> {
        match self.called_definitions.get(call_activity_id) {
            Some(Ok(definition_id)) => self.models.get(definition_id).ok_or_else(|| {
                format!("Process definition '{}' is not loaded", definition_id)
            }),
            Some(Err(reason)) => Err(reason.clone()),
            None => Err(format!(
                "Call activity '{}' cannot be found in the process definition with id '{}'",
                call_activity_id,
                self.target().id
            )),
        }
    }

    /// Model of an instance in the snapshot.
    pub fn model_of(&self, instance: &InstanceState) -> Option<&ProcessModel> {
        self.models.get(&instance.definition_id)
    }
}

/// Loads models and runtime state for migrations.
pub struct ModelResolver<'a> {
    models: &'a dyn ModelProvider,
    instances: &'a dyn InstanceRepository,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> ModelResolver<'a> {
    pub fn new(
        models: &'a dyn ModelProvider,
        instances: &'a dyn InstanceRepository,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> Self {
        Self {
            models,
            instances,
            evaluator,
        }
    }

    /// Resolve the document's target definition; `NotFound` when absent.
    pub async fn resolve_target(&self, target: &DefinitionTarget) -> AppResult<Arc<ProcessModel>> {
        match target {
            DefinitionTarget::Id(id) => self.models.get_model(id).await,
            DefinitionTarget::Key {
                key,
                version,
                tenant_id,
            } => self
                .models
                .find_model(key, Some(*version), tenant_id.as_deref())
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("process definition with {}", target))
                }),
        }
    }

    /// Load an instance together with its sub-process instances.
    pub async fn load_snapshot(&self, instance_id: &str) -> AppResult<RuntimeSnapshot> {
        let root = self.instances.load_instance(instance_id).await?;
        let mut snapshot = RuntimeSnapshot::new(root);
        let mut queue = vec![instance_id.to_string()];

        while let Some(current) = queue.pop() {
            let call_executions: Vec<String> = snapshot
                .instance(&current)
                .map(|i| {
                    i.executions
                        .iter()
                        .filter(|e| e.sub_process_instance_id.is_some())
                        .map(|e| e.id.clone())
                        .collect()
                })
                .unwrap_or_default();

            for execution_id in call_executions {
                let Some(sub_id) = self
                    .instances
                    .find_sub_process_instance(&execution_id)
                    .await?
                else {
                    continue;
                };
                if snapshot.instance(&sub_id).is_some() {
                    continue;
                }
                let sub = self.instances.load_instance(&sub_id).await?;
                snapshot.insert(sub);
                queue.push(sub_id);
            }
        }

        Ok(snapshot)
    }

    /// Build the context for migrating one instance to `target`.
    pub async fn build(
        &self,
        instance_id: &str,
        doc: &MigrationDocument,
        target: Arc<ProcessModel>,
    ) -> AppResult<MigrationContext> {
        let snapshot = self.load_snapshot(instance_id).await?;
        let current = self.models.get_model(&snapshot.root().definition_id).await?;
        let mut models = ModelSet::new(current, target.clone());

        for instance in snapshot.sub_instances.values() {
            if !models.contains(&instance.definition_id) {
                models.add(self.models.get_model(&instance.definition_id).await?);
            }
        }

        let mut scope = doc.process_variables().clone();
        scope.extend(snapshot.root().variables.clone());
        let tenant_id = snapshot.root().tenant_id.clone();

        let mut called_definitions = HashMap::new();
        for node in target.activities().filter(|n| n.is_call_activity()) {
            let Some(ref called_element) = node.called_element else {
                continue;
            };
            let version = doc
                .mappings()
                .iter()
                .filter_map(|m| m.to_call_activity.as_ref())
                .find(|t| t.call_activity_id == node.id)
                .and_then(|t| t.definition_version);

            let resolved = match self.called_key(called_element, &scope) {
                Ok(key) => match self.models.find_model(&key, version, tenant_id.as_deref()).await? {
                    Some(model) => {
                        let id = model.id.clone();
                        models.add(model);
                        Ok(id)
                    }
                    None => Err(format!(
                        "Cannot find the process definition with key '{}'{} called by call activity '{}'",
                        key,
                        version.map(|v| format!(" and version {}", v)).unwrap_or_default(),
                        node.id
                    )),
                },
                Err(e) => Err(format!(
                    "Cannot resolve the called element '{}' of call activity '{}': {}",
                    called_element, node.id, e
                )),
            };
            called_definitions.insert(node.id.clone(), resolved);
        }

        debug!(
            instance_id = %instance_id,
            sub_instances = snapshot.sub_instances.len(),
            models = models.models.len(),
            "Loaded migration context"
        );

        Ok(MigrationContext::new(
            snapshot,
            models,
            called_definitions,
            doc.process_variables(),
        ))
    }

    fn called_key(&self, called_element: &str, scope: &Map<String, Value>) -> AppResult<String> {
        if !is_expression(called_element) {
            return Ok(called_element.to_string());
        }
        match self.evaluator.evaluate(called_element, scope)? {
            Value::String(key) => Ok(key),
            Value::Null => Err(AppError::Template(
                "called element evaluated to null".to_string(),
            )),
            other => Ok(other.to_string()),
        }
    }
}
