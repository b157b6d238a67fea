//! Execution trees.
//!
//! Every process instance owns a tree of executions. The root execution
//! shares the instance id and points at no activity. Containers own an
//! inactive scope execution, multi-instance activities an inactive
//! multi-instance root with one child per element, and call activities
//! an active execution that references the called sub-process instance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

use crate::model::{ActivityKind, ProcessModel};

/// Snapshot of one live execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionNode {
    pub id: String,
    pub process_instance_id: String,
    pub parent_id: Option<String>,
    pub activity_id: Option<String>,
    pub active: bool,
    pub is_scope: bool,
    pub multi_instance_root: bool,
    pub sub_process_instance_id: Option<String>,
    #[serde(default)]
    pub local_variables: Map<String, Value>,
    pub assignee: Option<String>,
    pub owner: Option<String>,
}

impl ExecutionNode {
    /// Root execution of an instance.
    pub fn root(instance_id: &str) -> Self {
        Self {
            id: instance_id.to_string(),
            process_instance_id: instance_id.to_string(),
            parent_id: None,
            activity_id: None,
            active: false,
            is_scope: true,
            multi_instance_root: false,
            sub_process_instance_id: None,
            local_variables: Map::new(),
            assignee: None,
            owner: None,
        }
    }

    /// Active execution sitting at an activity.
    pub fn at_activity(id: String, instance_id: &str, parent_id: &str, activity_id: &str) -> Self {
        Self {
            id,
            process_instance_id: instance_id.to_string(),
            parent_id: Some(parent_id.to_string()),
            activity_id: Some(activity_id.to_string()),
            active: true,
            is_scope: false,
            multi_instance_root: false,
            sub_process_instance_id: None,
            local_variables: Map::new(),
            assignee: None,
            owner: None,
        }
    }

    /// Inactive scope execution of a container or multi-instance root.
    pub fn scope(id: String, instance_id: &str, parent_id: &str, activity_id: &str) -> Self {
        Self {
            active: false,
            is_scope: true,
            ..Self::at_activity(id, instance_id, parent_id, activity_id)
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_at(&self, activity_id: &str) -> bool {
        self.activity_id.as_deref() == Some(activity_id)
    }
}

/// One process instance with its execution tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceState {
    pub id: String,
    pub definition_id: String,
    pub tenant_id: Option<String>,
    pub parent_instance_id: Option<String>,
    /// Call activity execution in the parent instance that started this one
    pub super_execution_id: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Optimistic lock counter, bumped on every committed change
    pub revision: i64,
    pub executions: Vec<ExecutionNode>,
}

impl InstanceState {
    /// Create a new instance holding only its root execution.
    pub fn new(id: impl Into<String>, definition_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            executions: vec![ExecutionNode::root(&id)],
            id,
            definition_id: definition_id.into(),
            tenant_id: None,
            parent_instance_id: None,
            super_execution_id: None,
            variables: Map::new(),
            revision: 1,
        }
    }

    pub fn execution(&self, id: &str) -> Option<&ExecutionNode> {
        self.executions.iter().find(|e| e.id == id)
    }

    pub fn execution_mut(&mut self, id: &str) -> Option<&mut ExecutionNode> {
        self.executions.iter_mut().find(|e| e.id == id)
    }

    pub fn children<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a ExecutionNode> {
        self.executions
            .iter()
            .filter(move |e| e.parent_id.as_deref() == Some(parent_id))
    }

    /// Ids of an execution and all its descendants.
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut result = vec![id.to_string()];
        let mut cursor = 0;
        while cursor < result.len() {
            let parent = result[cursor].clone();
            result.extend(self.children(&parent).map(|e| e.id.clone()));
            cursor += 1;
        }
        result
    }

    /// Activity ids of the execution's ancestors, outermost first, with
    /// multi-instance root/element pairs collapsed into one entry.
    pub fn scope_chain_of(&self, id: &str) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = self.execution(id).and_then(|e| e.parent_id.clone());
        while let Some(parent_id) = current {
            let Some(parent) = self.execution(&parent_id) else {
                break;
            };
            if let Some(ref activity) = parent.activity_id {
                if chain.last() != Some(activity) {
                    chain.push(activity.clone());
                }
            }
            current = parent.parent_id.clone();
        }
        chain.reverse();
        chain
    }

    pub fn active_executions(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.executions.iter().filter(|e| e.active)
    }

    /// Active executions that can be mapped: they sit at an activity that is
    /// neither a container nor a boundary event.
    pub fn mappable_executions<'a>(
        &'a self,
        model: &'a ProcessModel,
    ) -> impl Iterator<Item = &'a ExecutionNode> {
        self.active_executions().filter(move |e| {
            let Some(ref activity) = e.activity_id else {
                return false;
            };
            match model.kind_of(activity) {
                Some(kind) => !kind.is_container() && kind != ActivityKind::BoundaryEvent,
                None => true,
            }
        })
    }

    /// Distinct activity ids of the mappable executions, in tree order.
    pub fn running_activity_ids(&self, model: &ProcessModel) -> Vec<String> {
        let mut seen = HashSet::new();
        self.mappable_executions(model)
            .filter_map(|e| e.activity_id.clone())
            .filter(|a| seen.insert(a.clone()))
            .collect()
    }

    /// Distinct activity ids of all active executions, sorted.
    pub fn active_activity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .active_executions()
            .filter_map(|e| e.activity_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// An instance together with every sub-process instance below it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub root: InstanceState,
    /// Sub-process instances keyed by id
    pub sub_instances: BTreeMap<String, InstanceState>,
}

impl RuntimeSnapshot {
    pub fn new(root: InstanceState) -> Self {
        Self {
            root,
            sub_instances: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, instance: InstanceState) {
        if instance.id == self.root.id {
            self.root = instance;
        } else {
            self.sub_instances.insert(instance.id.clone(), instance);
        }
    }

    pub fn root(&self) -> &InstanceState {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut InstanceState {
        &mut self.root
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceState> {
        if self.root.id == id {
            Some(&self.root)
        } else {
            self.sub_instances.get(id)
        }
    }

    pub fn instance_mut(&mut self, id: &str) -> Option<&mut InstanceState> {
        if self.root.id == id {
            Some(&mut self.root)
        } else {
            self.sub_instances.get_mut(id)
        }
    }

    /// Root first, then sub-process instances.
    pub fn instances(&self) -> impl Iterator<Item = &InstanceState> {
        std::iter::once(&self.root).chain(self.sub_instances.values())
    }

    pub fn remove(&mut self, id: &str) -> Option<InstanceState> {
        self.sub_instances.remove(id)
    }

    /// Ids of an instance and every sub-process instance below it.
    pub fn instance_subtree(&self, id: &str) -> Vec<String> {
        let mut result = vec![id.to_string()];
        let mut cursor = 0;
        while cursor < result.len() {
            let current = result[cursor].clone();
            result.extend(
                self.sub_instances
                    .values()
                    .filter(|i| i.parent_instance_id.as_deref() == Some(current.as_str()))
                    .map(|i| i.id.clone()),
            );
            cursor += 1;
        }
        result
    }
}
