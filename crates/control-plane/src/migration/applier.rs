//! Execution tree transformation.
//!
//! [`ExecutionTreeApplier`] applies a [`TransformPlan`] to a copy of the
//! runtime snapshot. Executions that keep their activity are rebound in
//! place (relocated when their container chain changed); all others are
//! removed with their subtree and recreated at the target activity.
//! Multi-instance containers are recreated as a whole whenever their shape
//! changed.

use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::expression::{is_expression, ExpressionEvaluator};
use crate::migration::context::MigrationContext;
use crate::migration::planner::{MoveOperation, ScopedPlan, TransformPlan};
use crate::migration::resolver::{CallActivityEntry, MappingScope};
use crate::model::{ActivityKind, ActivityNode, MultiInstance, ProcessModel};
use crate::runtime::{ExecutionNode, InstanceState, RuntimeSnapshot};

/// Instances created and removed while applying a plan.
#[derive(Debug, Clone, Default)]
pub struct TreeChanges {
    pub created_instance_ids: Vec<String>,
    pub removed_instance_ids: Vec<String>,
}

/// Applies transform plans to live execution trees.
pub trait StateTransformApplier: Send + Sync {
    /// Apply `plan` to `snapshot`, a copy of `ctx.snapshot` whose root
    /// already points at the target definition.
    fn apply(
        &self,
        ctx: &MigrationContext,
        plan: &TransformPlan,
        snapshot: &mut RuntimeSnapshot,
    ) -> AppResult<TreeChanges>;
}

/// Default applier over in-memory execution trees.
pub struct ExecutionTreeApplier {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl ExecutionTreeApplier {
    /// Create a new applier evaluating multi-instance cardinalities with `evaluator`.
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl StateTransformApplier for ExecutionTreeApplier {
    fn apply(
        &self,
        ctx: &MigrationContext,
        plan: &TransformPlan,
        snapshot: &mut RuntimeSnapshot,
    ) -> AppResult<TreeChanges> {
        let mut editor = TreeEditor {
            ctx,
            evaluator: self.evaluator.as_ref(),
            snapshot,
            changes: TreeChanges::default(),
        };

        for scoped in &plan.scopes {
            match scoped.scope {
                MappingScope::Main => editor.apply_main(scoped)?,
                MappingScope::SubProcessInstance {
                    ref instance_id,
                    ref call_activity_execution_id,
                } => editor.apply_to_parent(scoped, instance_id, call_activity_execution_id)?,
            }
        }

        for execution_id in &plan.emptied_call_executions {
            editor.finish_call_execution(execution_id);
        }
        editor.prune_empty_scopes();

        debug!(
            instance_id = %ctx.instance_id(),
            moves = plan.move_count(),
            created_instances = editor.changes.created_instance_ids.len(),
            removed_instances = editor.changes.removed_instance_ids.len(),
            "Applied transform plan"
        );
        Ok(editor.changes)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

struct TreeEditor<'a> {
    ctx: &'a MigrationContext,
    evaluator: &'a dyn ExpressionEvaluator,
    snapshot: &'a mut RuntimeSnapshot,
    changes: TreeChanges,
}

impl<'a> TreeEditor<'a> {
    fn root_id(&self) -> String {
        self.snapshot.root().id.clone()
    }

    fn instance_mut(&mut self, instance_id: &str) -> AppResult<&mut InstanceState> {
        self.snapshot
            .instance_mut(instance_id)
            .ok_or_else(|| AppError::NotFound(format!("process instance {}", instance_id)))
    }

    fn instance(&self, instance_id: &str) -> AppResult<&InstanceState> {
        self.snapshot
            .instance(instance_id)
            .ok_or_else(|| AppError::NotFound(format!("process instance {}", instance_id)))
    }

    fn apply_main(&mut self, scoped: &ScopedPlan) -> AppResult<()> {
        let root_id = self.root_id();
        let target = self.ctx.target();

        for operation in &scoped.moves {
            self.apply_move(&root_id, operation)?;
        }

        for activity_id in &scoped.enable_activity_ids {
            let parent = self.ensure_scope(&root_id, &target.scope_chain(activity_id))?;
            self.create_at(&root_id, target, &parent, activity_id, None, 1)?;
        }
        Ok(())
    }

    fn apply_move(&mut self, root_id: &str, operation: &MoveOperation) -> AppResult<()> {
        let current = self.ctx.current();
        let target = self.ctx.target();

        if let ([execution_id], [to], None) = (
            operation.execution_ids.as_slice(),
            operation.to_activity_ids.as_slice(),
            operation.call_activity_entry.as_ref(),
        ) {
            let execution = self
                .instance(root_id)?
                .execution(execution_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("execution {}", execution_id)))?;
            if execution.is_at(to) && self.can_rebind(root_id, &execution, to)? {
                return self.rebind(root_id, &execution, to, operation);
            }
        }

        let mut instance_count = 1;
        for execution_id in &operation.execution_ids {
            instance_count = instance_count.max(self.element_count(root_id, execution_id));
            self.remove_execution(root_id, execution_id, current);
        }

        match operation.call_activity_entry {
            None => {
                for to in &operation.to_activity_ids {
                    let parent = self.ensure_scope(root_id, &target.scope_chain(to))?;
                    self.create_at(root_id, target, &parent, to, Some(operation), instance_count)?;
                }
            }
            Some(ref entry) => {
                let sub_id = self.ensure_call_activity(root_id, entry)?;
                let called = self.ctx.models.get(&entry.definition_id).ok_or_else(|| {
                    AppError::NotFound(format!("process definition {}", entry.definition_id))
                })?;
                for to in &operation.to_activity_ids {
                    let parent = self.ensure_scope(&sub_id, &called.scope_chain(to))?;
                    self.create_at(&sub_id, called, &parent, to, Some(operation), instance_count)?;
                }
            }
        }
        Ok(())
    }

    /// Executions of the sub-process instance move to the migrated instance;
    /// the sub-process instance ends once nothing is left active in it.
    fn apply_to_parent(
        &mut self,
        scoped: &ScopedPlan,
        sub_instance_id: &str,
        call_execution_id: &str,
    ) -> AppResult<()> {
        let root_id = self.root_id();
        let target = self.ctx.target();
        let sub_definition = self.instance(sub_instance_id)?.definition_id.clone();
        let sub_model = self.ctx.models.get(&sub_definition).ok_or_else(|| {
            AppError::NotFound(format!("process definition {}", sub_definition))
        })?;

        for operation in &scoped.moves {
            let mut instance_count = 1;
            for execution_id in &operation.execution_ids {
                instance_count = instance_count.max(self.element_count(sub_instance_id, execution_id));
                self.remove_execution(sub_instance_id, execution_id, sub_model);
            }
            for to in &operation.to_activity_ids {
                let parent = self.ensure_scope(&root_id, &target.scope_chain(to))?;
                self.create_at(&root_id, target, &parent, to, Some(operation), instance_count)?;
            }
        }

        self.finish_call_execution(call_execution_id);
        Ok(())
    }

    /// Remove a call activity execution whose sub-process instance has no
    /// active execution left.
    fn finish_call_execution(&mut self, call_execution_id: &str) {
        let root_id = self.snapshot.root().id.clone();
        let Some(execution) = self.snapshot.root().execution(call_execution_id).cloned() else {
            return;
        };
        let still_running = execution
            .sub_process_instance_id
            .as_deref()
            .and_then(|sub_id| self.snapshot.instance(sub_id))
            .is_some_and(|sub| sub.active_executions().next().is_some());
        if !still_running {
            let current = self.ctx.current();
            self.remove_execution(&root_id, call_execution_id, current);
        }
    }

    fn can_rebind(&self, instance_id: &str, execution: &ExecutionNode, to: &str) -> AppResult<bool> {
        let (Some(source), Some(target)) = (self.ctx.current().activity(to), self.ctx.target().activity(to))
        else {
            return Ok(false);
        };
        if source.kind != target.kind {
            return Ok(false);
        }
        if !execution.multi_instance_root {
            return Ok(!target.is_multi_instance());
        }

        // Keep a multi-instance subtree only when its shape is unchanged
        if source.multi_instance != target.multi_instance {
            return Ok(false);
        }
        let instance = self.instance(instance_id)?;
        let target_model = self.ctx.target();
        let inner_intact = instance
            .subtree_ids(&execution.id)
            .iter()
            .filter_map(|id| instance.execution(id))
            .filter_map(|e| e.activity_id.as_deref())
            .filter(|activity| *activity != to)
            .all(|activity| target_model.is_ancestor(to, activity));
        Ok(inner_intact)
    }

    fn rebind(
        &mut self,
        instance_id: &str,
        execution: &ExecutionNode,
        to: &str,
        operation: &MoveOperation,
    ) -> AppResult<()> {
        let current = self.ctx.current();
        let target = self.ctx.target();
        let old_parent = execution.parent_id.clone().unwrap_or_else(|| instance_id.to_string());

        self.remove_boundary_events(instance_id, &old_parent, to, current);

        let chain = target.scope_chain(to);
        let parent = if self.instance(instance_id)?.scope_chain_of(&execution.id) == chain {
            old_parent
        } else {
            let parent = self.ensure_scope(instance_id, &chain)?;
            if let Some(moved) = self.instance_mut(instance_id)?.execution_mut(&execution.id) {
                moved.parent_id = Some(parent.clone());
            }
            debug!(execution_id = %execution.id, activity_id = %to, "Relocated execution");
            parent
        };

        self.create_boundary_events(instance_id, target, &parent, to)?;

        let subtree = self.instance(instance_id)?.subtree_ids(&execution.id);
        self.assign(instance_id, target, &subtree, operation)
    }

    /// Ensure the container scope executions of `chain` exist and return the
    /// innermost one.
    fn ensure_scope(&mut self, instance_id: &str, chain: &[String]) -> AppResult<String> {
        let instance = self.instance_mut(instance_id)?;
        let mut parent = instance.id.clone();
        for container in chain {
            let existing = instance
                .children(&parent)
                .find(|e| e.is_at(container) && e.is_scope && !e.multi_instance_root)
                .map(|e| e.id.clone());
            parent = match existing {
                Some(id) => id,
                None => {
                    let scope = ExecutionNode::scope(new_id(), &instance.id, &parent, container);
                    let id = scope.id.clone();
                    instance.executions.push(scope);
                    id
                }
            };
        }
        Ok(parent)
    }

    /// Create executions for `activity_id` under `parent`. Assignments of
    /// `operation` are applied to the created user tasks.
    fn create_at(
        &mut self,
        instance_id: &str,
        model: &ProcessModel,
        parent: &str,
        activity_id: &str,
        operation: Option<&MoveOperation>,
        fallback_count: usize,
    ) -> AppResult<()> {
        let node = model.activity(activity_id).ok_or_else(|| {
            AppError::Migration(format!(
                "Activity '{}' cannot be found in the process definition with id '{}'",
                activity_id, model.id
            ))
        })?;

        let mut created = Vec::new();
        match node.multi_instance {
            Some(ref multi_instance) => {
                let count = self.instance_count(multi_instance, fallback_count)?;
                let elements = if multi_instance.sequential { count.min(1) } else { count };
                let collection = self.collection(multi_instance)?;

                let mut root = ExecutionNode::scope(new_id(), instance_id, parent, activity_id);
                root.multi_instance_root = true;
                root.local_variables.insert("nrOfInstances".to_string(), json!(count));
                root.local_variables.insert("nrOfActiveInstances".to_string(), json!(elements));
                root.local_variables.insert("nrOfCompletedInstances".to_string(), json!(0));
                let root_id = root.id.clone();
                self.instance_mut(instance_id)?.executions.push(root);

                for index in 0..elements {
                    let mut locals = Map::new();
                    locals.insert("loopCounter".to_string(), json!(index));
                    if let (Some(name), Some(items)) = (&multi_instance.element_variable, &collection) {
                        if let Some(item) = items.get(index) {
                            locals.insert(name.clone(), item.clone());
                        }
                    }
                    created.extend(self.create_single(instance_id, model, &root_id, node, locals)?);
                }
            }
            None => {
                created.extend(self.create_single(instance_id, model, parent, node, Map::new())?);
            }
        }

        self.create_boundary_events(instance_id, model, parent, activity_id)?;

        if let Some(operation) = operation {
            self.assign(instance_id, model, &created, operation)?;
        }
        Ok(())
    }

    fn create_single(
        &mut self,
        instance_id: &str,
        model: &ProcessModel,
        parent: &str,
        node: &ActivityNode,
        locals: Map<String, Value>,
    ) -> AppResult<Vec<String>> {
        if node.kind.is_container() {
            let mut scope = ExecutionNode::scope(new_id(), instance_id, parent, &node.id);
            scope.local_variables = locals;
            let scope_id = scope.id.clone();
            let start = model.initial_activity(Some(&node.id)).map(|n| n.id.clone());
            // A container without a start event is left waiting on its scope
            scope.active = start.is_none();
            let instance = self.instance_mut(instance_id)?;
            instance.executions.push(scope);
            if let Some(start) = start {
                let child = ExecutionNode::at_activity(new_id(), instance_id, &scope_id, &start);
                let child_id = child.id.clone();
                instance.executions.push(child);
                return Ok(vec![child_id]);
            }
            return Ok(vec![scope_id]);
        }

        let mut execution = ExecutionNode::at_activity(new_id(), instance_id, parent, &node.id);
        execution.local_variables = locals;
        let execution_id = execution.id.clone();
        self.instance_mut(instance_id)?.executions.push(execution);

        if node.kind == ActivityKind::CallActivity {
            let called = self.ctx.called_model(&node.id).map_err(AppError::Migration)?;
            self.start_sub_instance(instance_id, &execution_id, called, true)?;
        }
        Ok(vec![execution_id])
    }

    /// Reuse the call activity execution entered by an earlier move or
    /// create it together with its sub-process instance.
    fn ensure_call_activity(&mut self, instance_id: &str, entry: &CallActivityEntry) -> AppResult<String> {
        let existing = self
            .instance(instance_id)?
            .executions
            .iter()
            .filter(|e| e.is_at(&entry.call_activity_id))
            .filter_map(|e| e.sub_process_instance_id.clone())
            .find(|sub_id| {
                self.snapshot
                    .instance(sub_id)
                    .is_some_and(|sub| sub.definition_id == entry.definition_id)
            });
        if let Some(sub_id) = existing {
            return Ok(sub_id);
        }

        let target = self.ctx.target();
        let parent = self.ensure_scope(instance_id, &target.scope_chain(&entry.call_activity_id))?;
        let execution = ExecutionNode::at_activity(new_id(), instance_id, &parent, &entry.call_activity_id);
        let execution_id = execution.id.clone();
        self.instance_mut(instance_id)?.executions.push(execution);
        self.create_boundary_events(instance_id, target, &parent, &entry.call_activity_id)?;

        let called = self.ctx.models.get(&entry.definition_id).ok_or_else(|| {
            AppError::NotFound(format!("process definition {}", entry.definition_id))
        })?;
        self.start_sub_instance(instance_id, &execution_id, called, false)
    }

    fn start_sub_instance(
        &mut self,
        caller_instance_id: &str,
        call_execution_id: &str,
        called: &ProcessModel,
        at_start: bool,
    ) -> AppResult<String> {
        let mut sub = InstanceState::new(new_id(), called.id.clone());
        sub.tenant_id = self.snapshot.root().tenant_id.clone();
        sub.parent_instance_id = Some(caller_instance_id.to_string());
        sub.super_execution_id = Some(call_execution_id.to_string());
        let sub_id = sub.id.clone();

        if at_start {
            if let Some(start) = called.initial_activity(None) {
                sub.executions
                    .push(ExecutionNode::at_activity(new_id(), &sub_id, &sub_id, &start.id));
            }
        }

        if let Some(call) = self.instance_mut(caller_instance_id)?.execution_mut(call_execution_id) {
            call.sub_process_instance_id = Some(sub_id.clone());
        }
        self.snapshot.insert(sub);
        self.changes.created_instance_ids.push(sub_id.clone());
        debug!(
            sub_instance_id = %sub_id,
            definition_id = %called.id,
            "Started sub-process instance"
        );
        Ok(sub_id)
    }

    fn create_boundary_events(
        &mut self,
        instance_id: &str,
        model: &ProcessModel,
        parent: &str,
        activity_id: &str,
    ) -> AppResult<()> {
        let events: Vec<String> = model
            .boundary_events(activity_id)
            .iter()
            .map(|n| n.id.clone())
            .collect();
        let instance = self.instance_mut(instance_id)?;
        for event in events {
            instance
                .executions
                .push(ExecutionNode::at_activity(new_id(), instance_id, parent, &event));
        }
        Ok(())
    }

    fn remove_boundary_events(&mut self, instance_id: &str, parent: &str, activity_id: &str, model: &ProcessModel) {
        let events: HashSet<&str> = model
            .boundary_events(activity_id)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        if let Some(instance) = self.snapshot.instance_mut(instance_id) {
            instance.executions.retain(|e| {
                e.parent_id.as_deref() != Some(parent)
                    || !e.activity_id.as_deref().is_some_and(|a| events.contains(a))
            });
        }
    }

    /// Remove an execution, its subtree, its boundary events and every
    /// sub-process instance started below it.
    fn remove_execution(&mut self, instance_id: &str, execution_id: &str, model: &ProcessModel) {
        let Some(instance) = self.snapshot.instance(instance_id) else {
            return;
        };
        let Some(execution) = instance.execution(execution_id).cloned() else {
            return;
        };

        let removed: HashSet<String> = instance.subtree_ids(execution_id).into_iter().collect();
        let sub_instances: Vec<String> = instance
            .executions
            .iter()
            .filter(|e| removed.contains(&e.id))
            .filter_map(|e| e.sub_process_instance_id.clone())
            .collect();

        if let Some(instance) = self.snapshot.instance_mut(instance_id) {
            instance.executions.retain(|e| !removed.contains(&e.id));
        }
        if let (Some(parent), Some(activity)) = (&execution.parent_id, &execution.activity_id) {
            self.remove_boundary_events(instance_id, parent, activity, model);
        }
        for sub_id in sub_instances {
            self.remove_instance_tree(&sub_id);
        }
    }

    fn remove_instance_tree(&mut self, instance_id: &str) {
        for id in self.snapshot.instance_subtree(instance_id) {
            if self.snapshot.remove(&id).is_none() {
                continue;
            }
            let created = self.changes.created_instance_ids.iter().position(|c| *c == id);
            match created {
                Some(position) => {
                    self.changes.created_instance_ids.remove(position);
                }
                None => self.changes.removed_instance_ids.push(id),
            }
        }
    }

    /// Drop inactive scope executions left without children.
    fn prune_empty_scopes(&mut self) {
        let ids: Vec<String> = self.snapshot.instances().map(|i| i.id.clone()).collect();
        for id in ids {
            let Some(instance) = self.snapshot.instance_mut(&id) else {
                continue;
            };
            loop {
                let parents: HashSet<String> = instance
                    .executions
                    .iter()
                    .filter_map(|e| e.parent_id.clone())
                    .collect();
                let before = instance.executions.len();
                instance
                    .executions
                    .retain(|e| e.is_root() || e.active || parents.contains(&e.id));
                if instance.executions.len() == before {
                    break;
                }
            }
        }
    }

    /// Number of elements of a multi-instance root, 1 for anything else.
    fn element_count(&self, instance_id: &str, execution_id: &str) -> usize {
        let Some(instance) = self.snapshot.instance(instance_id) else {
            return 1;
        };
        match instance.execution(execution_id) {
            Some(e) if e.multi_instance_root => e
                .local_variables
                .get("nrOfInstances")
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or_else(|| instance.children(execution_id).count())
                .max(1),
            _ => 1,
        }
    }

    fn instance_count(&self, multi_instance: &MultiInstance, fallback: usize) -> AppResult<usize> {
        if let Some(ref cardinality) = multi_instance.cardinality {
            if let Ok(n) = cardinality.trim().parse::<usize>() {
                return Ok(n);
            }
            let value = self.lookup(cardinality)?;
            let parsed = match &value {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                Value::String(s) => s.trim().parse::<usize>().ok(),
                _ => None,
            };
            return parsed.ok_or_else(|| {
                AppError::Migration(format!(
                    "Multi-instance cardinality '{}' resolved to {}, expected a number",
                    cardinality, value
                ))
            });
        }
        if let Some(items) = self.collection(multi_instance)? {
            return Ok(items.len());
        }
        Ok(fallback)
    }

    fn collection(&self, multi_instance: &MultiInstance) -> AppResult<Option<Vec<Value>>> {
        let Some(ref collection) = multi_instance.collection else {
            return Ok(None);
        };
        match self.lookup(collection)? {
            Value::Array(items) => Ok(Some(items)),
            other => Err(AppError::Migration(format!(
                "Multi-instance collection '{}' resolved to {}, expected a list",
                collection, other
            ))),
        }
    }

    /// An expression, or else the name of an instance variable.
    fn lookup(&self, reference: &str) -> AppResult<Value> {
        if is_expression(reference) {
            return self.evaluator.evaluate(reference, self.ctx.scope());
        }
        self.ctx.scope().get(reference).cloned().ok_or_else(|| {
            AppError::Migration(format!("Variable '{}' is not defined", reference))
        })
    }

    fn assign(
        &mut self,
        instance_id: &str,
        model: &ProcessModel,
        execution_ids: &[String],
        operation: &MoveOperation,
    ) -> AppResult<()> {
        if operation.new_assignee.is_none() && operation.new_owner.is_none() {
            return Ok(());
        }
        let instance = self.instance_mut(instance_id)?;
        for execution in instance
            .executions
            .iter_mut()
            .filter(|e| e.active && execution_ids.contains(&e.id))
        {
            let is_user_task = execution
                .activity_id
                .as_deref()
                .and_then(|a| model.kind_of(a))
                == Some(ActivityKind::UserTask);
            if !is_user_task {
                continue;
            }
            if let Some(ref assignee) = operation.new_assignee {
                execution.assignee = Some(assignee.clone());
            }
            if let Some(ref owner) = operation.new_owner {
                execution.owner = Some(owner.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::TemplateEvaluator;
    use crate::migration::document::{ActivityMigrationMapping, MigrationDocument};
    use crate::migration::fixtures::*;
    use crate::migration::planner::plan;
    use crate::migration::resolver::resolve;

    fn apply(ctx: &MigrationContext, doc: &MigrationDocument) -> (RuntimeSnapshot, TreeChanges) {
        let transform = plan(&resolve(ctx, doc).unwrap());
        let mut snapshot = ctx.snapshot.clone();
        snapshot.root_mut().definition_id = ctx.target().id.clone();
        let applier = ExecutionTreeApplier::new(Arc::new(TemplateEvaluator::new()));
        let changes = applier.apply(ctx, &transform, &mut snapshot).unwrap();
        (snapshot, changes)
    }

    fn activities(instance: &InstanceState) -> Vec<String> {
        instance.active_activity_ids()
    }

    #[test]
    fn test_mapped_task_is_recreated_and_unmapped_task_kept() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA"), ("e2", "taskC")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let doc = MigrationDocument::builder()
            .migrate_to_definition_id("tasks:2")
            .add_mapping(ActivityMigrationMapping::one_to_one("taskA", "taskB").with_new_assignee("kermit"))
            .build()
            .unwrap();
        let (snapshot, _) = apply(&ctx, &doc);
        let root = snapshot.root();

        assert_eq!(activities(root), vec!["taskB", "taskC"]);
        assert!(root.execution("e1").is_none());
        assert!(root.execution("e2").is_some());
        let task_b = root.executions.iter().find(|e| e.is_at("taskB")).unwrap();
        assert_eq!(task_b.assignee.as_deref(), Some("kermit"));
    }

    #[test]
    fn test_move_into_sub_process_creates_scope_and_boundary_event() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let doc = MigrationDocument::builder()
            .migrate_to_definition_id("tasks:2")
            .add_mapping(ActivityMigrationMapping::one_to_one("taskA", "inner"))
            .build()
            .unwrap();
        let (snapshot, _) = apply(&ctx, &doc);
        let root = snapshot.root();

        let inner = root.executions.iter().find(|e| e.is_at("inner")).unwrap();
        let scope = root.execution(inner.parent_id.as_deref().unwrap()).unwrap();
        assert!(scope.is_at("sub1"));
        assert!(scope.is_scope);
        assert!(root
            .children(&scope.id)
            .any(|e| e.is_at("timer") && e.active));
    }

    #[test]
    fn test_unchanged_multi_instance_is_rebound() {
        let ctx = context(
            multi_instance_running(),
            model("multi:1", MULTI_V1),
            model("multi:2", MULTI_V2),
        );
        let doc = MigrationDocument::builder()
            .migrate_to_definition_id("multi:2")
            .build()
            .unwrap();
        let (snapshot, _) = apply(&ctx, &doc);

        assert_eq!(snapshot.root().executions, ctx.instance().executions);
    }

    #[test]
    fn test_multi_instance_mapped_to_new_activity_is_rebuilt() {
        let mut running = multi_instance_running();
        running
            .variables
            .insert("nrOfReviewers".to_string(), json!(3));
        let ctx = context(running, model("multi:1", MULTI_V1), model("multi:2", MULTI_V2));
        let doc = MigrationDocument::builder()
            .migrate_to_definition_id("multi:2")
            .add_mapping(ActivityMigrationMapping::one_to_one("review", "approve"))
            .build()
            .unwrap();
        let (snapshot, _) = apply(&ctx, &doc);
        let root = snapshot.root();

        assert!(root.executions.iter().all(|e| !e.is_at("review") && !e.is_at("check")));
        let mi_root = root
            .executions
            .iter()
            .find(|e| e.is_at("approve") && e.multi_instance_root)
            .unwrap();
        assert_eq!(mi_root.local_variables.get("nrOfInstances"), Some(&json!(3)));
        let elements: Vec<_> = root.children(&mi_root.id).collect();
        assert_eq!(elements.len(), 3);
        assert!(elements.iter().all(|e| e.active && e.is_at("approve")));
    }

    const PARENT_V1: &str = r#"
key: parent
version: 1
activities:
  - { id: callX, type: call_activity, calledElement: child }
"#;

    const PARENT_V2: &str = r#"
key: parent
version: 2
activities:
  - { id: taskP, type: user_task }
"#;

    const CHILD_V1: &str = r#"
key: child
version: 1
activities:
  - { id: subTask, type: user_task }
"#;

    #[test]
    fn test_children_moved_to_parent_end_the_sub_process_instance() {
        let mut root = instance("parent:1", &[("ca", "callX")]);
        root.executions[1].sub_process_instance_id = Some("sub-1".to_string());
        let mut sub = InstanceState::new("sub-1", "child:1");
        sub.parent_instance_id = Some("pi-1".to_string());
        sub.super_execution_id = Some("ca".to_string());
        push_active(&mut sub, "s1", "sub-1", "subTask");
        let mut snapshot = RuntimeSnapshot::new(root);
        snapshot.insert(sub);

        let ctx = context_with_calls(
            snapshot,
            vec![
                model("parent:1", PARENT_V1),
                model("parent:2", PARENT_V2),
                model("child:1", CHILD_V1),
            ],
            &[],
        );
        let doc = MigrationDocument::builder()
            .migrate_to_definition_id("parent:2")
            .add_mapping(ActivityMigrationMapping::one_to_one("subTask", "taskP").to_parent_process("callX"))
            .build()
            .unwrap();
        let (snapshot, changes) = apply(&ctx, &doc);

        assert_eq!(activities(snapshot.root()), vec!["taskP"]);
        assert!(snapshot.instance("sub-1").is_none());
        assert_eq!(changes.removed_instance_ids, vec!["sub-1"]);
    }
}
