//! Process model types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AppError;

/// Activity kinds of a process graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    StartEvent,
    EndEvent,
    UserTask,
    ServiceTask,
    ScriptTask,
    ReceiveTask,
    ManualTask,
    BusinessRuleTask,
    SendTask,
    Task,
    SubProcess,
    EventSubProcess,
    Transaction,
    CallActivity,
    BoundaryEvent,
    IntermediateCatchEvent,
    IntermediateThrowEvent,
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    EventBasedGateway,
}

impl ActivityKind {
    /// Kinds that contain other activities and own a scope execution.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ActivityKind::SubProcess | ActivityKind::EventSubProcess | ActivityKind::Transaction
        )
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivityKind::StartEvent => "start_event",
            ActivityKind::EndEvent => "end_event",
            ActivityKind::UserTask => "user_task",
            ActivityKind::ServiceTask => "service_task",
            ActivityKind::ScriptTask => "script_task",
            ActivityKind::ReceiveTask => "receive_task",
            ActivityKind::ManualTask => "manual_task",
            ActivityKind::BusinessRuleTask => "business_rule_task",
            ActivityKind::SendTask => "send_task",
            ActivityKind::Task => "task",
            ActivityKind::SubProcess => "sub_process",
            ActivityKind::EventSubProcess => "event_sub_process",
            ActivityKind::Transaction => "transaction",
            ActivityKind::CallActivity => "call_activity",
            ActivityKind::BoundaryEvent => "boundary_event",
            ActivityKind::IntermediateCatchEvent => "intermediate_catch_event",
            ActivityKind::IntermediateThrowEvent => "intermediate_throw_event",
            ActivityKind::ExclusiveGateway => "exclusive_gateway",
            ActivityKind::ParallelGateway => "parallel_gateway",
            ActivityKind::InclusiveGateway => "inclusive_gateway",
            ActivityKind::EventBasedGateway => "event_based_gateway",
        };
        write!(f, "{}", s)
    }
}

/// Multi-instance (loop) characteristics of an activity.
///
/// The instance count comes from `cardinality` (a literal or an expression)
/// or from the length of `collection` (a variable name or an expression).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiInstance {
    #[serde(default)]
    pub sequential: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_condition: Option<String>,
}

/// One node of a process graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityNode {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: ActivityKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Enclosing container activity, `None` at process level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_instance: Option<MultiInstance>,

    /// Called process key (call activities only); may be an expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_element: Option<String>,

    /// Activity a boundary event is attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
}

impl ActivityNode {
    pub fn is_multi_instance(&self) -> bool {
        self.multi_instance.is_some()
    }

    pub fn is_call_activity(&self) -> bool {
        self.kind == ActivityKind::CallActivity
    }
}

/// Wire shape of a process model, activities in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessModelDocument {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub activities: Vec<ActivityNode>,
}

fn default_version() -> i32 {
    1
}

/// Read-only process graph of one definition version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ProcessModelDocument", into = "ProcessModelDocument")]
pub struct ProcessModel {
    pub id: String,
    pub key: String,
    pub version: i32,
    pub tenant_id: Option<String>,
    activities: Vec<ActivityNode>,
    index: HashMap<String, usize>,
}

impl TryFrom<ProcessModelDocument> for ProcessModel {
    type Error = AppError;

    fn try_from(doc: ProcessModelDocument) -> Result<Self, Self::Error> {
        let mut index = HashMap::with_capacity(doc.activities.len());
        for (pos, node) in doc.activities.iter().enumerate() {
            if index.insert(node.id.clone(), pos).is_some() {
                return Err(AppError::Parse(format!(
                    "Duplicate activity id '{}' in process '{}'",
                    node.id, doc.key
                )));
            }
        }

        let model = Self {
            id: doc.id,
            key: doc.key,
            version: doc.version,
            tenant_id: doc.tenant_id,
            activities: doc.activities,
            index,
        };
        super::parser::validate_model(&model)?;
        Ok(model)
    }
}

impl From<ProcessModel> for ProcessModelDocument {
    fn from(model: ProcessModel) -> Self {
        Self {
            id: model.id,
            key: model.key,
            version: model.version,
            tenant_id: model.tenant_id,
            activities: model.activities,
        }
    }
}

impl ProcessModel {
    /// Assign the definition id, as done on deployment.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Default definition id derived from key and version.
    pub fn default_id(&self) -> String {
        format!("{}:{}", self.key, self.version)
    }

    pub fn activity(&self, id: &str) -> Option<&ActivityNode> {
        self.index.get(id).map(|&pos| &self.activities[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &ActivityNode> {
        self.activities.iter()
    }

    pub fn kind_of(&self, id: &str) -> Option<ActivityKind> {
        self.activity(id).map(|node| node.kind)
    }

    pub fn is_multi_instance(&self, id: &str) -> bool {
        self.activity(id).is_some_and(ActivityNode::is_multi_instance)
    }

    /// Strict ancestors of an activity, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&ActivityNode> {
        let mut result = Vec::new();
        let mut current = self.activity(id).and_then(|n| n.parent.as_deref());
        while let Some(parent_id) = current {
            let Some(parent) = self.activity(parent_id) else {
                break;
            };
            // parser rejects cycles; the bound keeps a hand-built model finite
            if result.len() > self.activities.len() {
                break;
            }
            result.push(parent);
            current = parent.parent.as_deref();
        }
        result
    }

    /// Container ids enclosing an activity, outermost first.
    pub fn scope_chain(&self, id: &str) -> Vec<String> {
        let mut chain: Vec<String> = self.ancestors(id).iter().map(|n| n.id.clone()).collect();
        chain.reverse();
        chain
    }

    /// Multi-instance containers strictly enclosing an activity, nearest first.
    pub fn multi_instance_ancestors(&self, id: &str) -> Vec<&ActivityNode> {
        self.ancestors(id)
            .into_iter()
            .filter(|n| n.is_multi_instance())
            .collect()
    }

    /// Whether the activity sits (strictly) inside a multi-instance container.
    pub fn is_nested_in_multi_instance(&self, id: &str) -> bool {
        self.ancestors(id).iter().any(|n| n.is_multi_instance())
    }

    /// Whether `ancestor` strictly encloses `id`.
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        self.ancestors(id).iter().any(|n| n.id == ancestor)
    }

    /// Boundary events attached to an activity.
    pub fn boundary_events(&self, attached_to: &str) -> Vec<&ActivityNode> {
        self.activities
            .iter()
            .filter(|n| {
                n.kind == ActivityKind::BoundaryEvent
                    && n.attached_to.as_deref() == Some(attached_to)
            })
            .collect()
    }

    /// Start event directly inside a container, or at process level for `None`.
    pub fn initial_activity(&self, container: Option<&str>) -> Option<&ActivityNode> {
        self.activities
            .iter()
            .find(|n| n.kind == ActivityKind::StartEvent && n.parent.as_deref() == container)
    }
}
