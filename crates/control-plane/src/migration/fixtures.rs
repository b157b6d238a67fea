//! Builders shared by the engine's unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Map;

use crate::migration::context::{MigrationContext, ModelSet};
use crate::model::{parse_model, ProcessModel};
use crate::runtime::{ExecutionNode, InstanceState, RuntimeSnapshot};

pub fn model(id: &str, yaml: &str) -> Arc<ProcessModel> {
    Arc::new(parse_model(yaml).unwrap().with_id(id))
}

/// Instance of `definition_id` with one active execution per
/// `(execution id, activity id)` directly under the root.
pub fn instance(definition_id: &str, executions: &[(&str, &str)]) -> InstanceState {
    let mut instance = InstanceState::new("pi-1", definition_id);
    for (id, activity) in executions {
        instance
            .executions
            .push(ExecutionNode::at_activity(id.to_string(), "pi-1", "pi-1", activity));
    }
    instance
}

pub fn push_scope(instance: &mut InstanceState, id: &str, parent: &str, activity: &str) {
    let scope = ExecutionNode::scope(id.to_string(), &instance.id, parent, activity);
    instance.executions.push(scope);
}

pub fn push_multi_instance_root(instance: &mut InstanceState, id: &str, parent: &str, activity: &str) {
    let mut root = ExecutionNode::scope(id.to_string(), &instance.id, parent, activity);
    root.multi_instance_root = true;
    instance.executions.push(root);
}

pub fn push_active(instance: &mut InstanceState, id: &str, parent: &str, activity: &str) {
    let execution = ExecutionNode::at_activity(id.to_string(), &instance.id, parent, activity);
    instance.executions.push(execution);
}

pub fn context(
    instance: InstanceState,
    current: Arc<ProcessModel>,
    target: Arc<ProcessModel>,
) -> MigrationContext {
    MigrationContext::new(
        RuntimeSnapshot::new(instance),
        ModelSet::new(current, target),
        HashMap::new(),
        &Map::new(),
    )
}

pub fn context_with_calls(
    snapshot: RuntimeSnapshot,
    models: Vec<Arc<ProcessModel>>,
    called: &[(&str, Result<&str, &str>)],
) -> MigrationContext {
    let mut iter = models.into_iter();
    let current = iter.next().unwrap();
    let target = iter.next().unwrap();
    let mut set = ModelSet::new(current, target);
    for model in iter {
        set.add(model);
    }
    let called = called
        .iter()
        .map(|(ca, def)| {
            (
                ca.to_string(),
                def.map(str::to_string).map_err(str::to_string),
            )
        })
        .collect();
    MigrationContext::new(snapshot, set, called, &Map::new())
}

pub const TASKS_V1: &str = r#"
key: tasks
version: 1
activities:
  - { id: start, type: start_event }
  - { id: taskA, type: user_task }
  - { id: taskC, type: user_task }
"#;

pub const TASKS_V2: &str = r#"
key: tasks
version: 2
activities:
  - { id: start, type: start_event }
  - { id: taskB, type: user_task }
  - { id: taskC, type: user_task }
  - { id: sub1, type: sub_process }
  - { id: subStart, type: start_event, parent: sub1 }
  - { id: inner, type: user_task, parent: sub1 }
  - { id: timer, type: boundary_event, parent: sub1, attachedTo: inner }
  - { id: loop, type: sub_process, multiInstance: { cardinality: "3" } }
  - { id: loopTask, type: user_task, parent: loop }
"#;

pub const MULTI_V1: &str = r#"
key: multi
version: 1
activities:
  - { id: review, type: sub_process, multiInstance: { cardinality: "2" } }
  - { id: check, type: user_task, parent: review }
  - { id: after, type: user_task }
"#;

pub const MULTI_V2: &str = r#"
key: multi
version: 2
activities:
  - { id: review, type: sub_process, multiInstance: { cardinality: "2" } }
  - { id: check, type: user_task, parent: review }
  - { id: approve, type: user_task, multiInstance: { cardinality: "nrOfReviewers" } }
  - { id: after, type: user_task }
"#;

/// Instance of MULTI_V1 with two elements of `review`, each at `check`.
pub fn multi_instance_running() -> InstanceState {
    let mut instance = InstanceState::new("pi-1", "multi:1");
    push_multi_instance_root(&mut instance, "mi", "pi-1", "review");
    push_scope(&mut instance, "el-1", "mi", "review");
    push_scope(&mut instance, "el-2", "mi", "review");
    push_active(&mut instance, "c-1", "el-1", "check");
    push_active(&mut instance, "c-2", "el-2", "check");
    instance
}
