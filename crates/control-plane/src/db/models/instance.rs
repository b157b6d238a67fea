//! Process instance and execution rows.

use serde_json::{Map, Value};
use sqlx::FromRow;

use crate::runtime::{ExecutionNode, InstanceState};

/// Row of `migration.process_instance`.
#[derive(Debug, Clone, FromRow)]
pub struct InstanceRow {
    pub id: String,
    pub definition_id: String,
    pub tenant_id: Option<String>,
    pub parent_instance_id: Option<String>,
    pub super_execution_id: Option<String>,
    pub variables: Value,
    pub revision: i64,
}

/// Row of `migration.execution`.
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub id: String,
    pub process_instance_id: String,
    pub parent_id: Option<String>,
    pub activity_id: Option<String>,
    pub active: bool,
    pub is_scope: bool,
    pub multi_instance_root: bool,
    pub sub_process_instance_id: Option<String>,
    pub local_variables: Value,
    pub assignee: Option<String>,
    pub owner: Option<String>,
}

pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl From<ExecutionRow> for ExecutionNode {
    fn from(row: ExecutionRow) -> Self {
        Self {
            id: row.id,
            process_instance_id: row.process_instance_id,
            parent_id: row.parent_id,
            activity_id: row.activity_id,
            active: row.active,
            is_scope: row.is_scope,
            multi_instance_root: row.multi_instance_root,
            sub_process_instance_id: row.sub_process_instance_id,
            local_variables: object(row.local_variables),
            assignee: row.assignee,
            owner: row.owner,
        }
    }
}

impl InstanceRow {
    /// Assemble the instance with its executions in stored order.
    pub fn into_state(self, executions: Vec<ExecutionRow>) -> InstanceState {
        InstanceState {
            id: self.id,
            definition_id: self.definition_id,
            tenant_id: self.tenant_id,
            parent_instance_id: self.parent_instance_id,
            super_execution_id: self.super_execution_id,
            variables: object(self.variables),
            revision: self.revision,
            executions: executions.into_iter().map(ExecutionNode::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_state_keeps_execution_order() {
        let row = InstanceRow {
            id: "pi-1".to_string(),
            definition_id: "p:1".to_string(),
            tenant_id: None,
            parent_instance_id: None,
            super_execution_id: None,
            variables: json!({ "amount": 10 }),
            revision: 4,
        };
        let execution = |id: &str, parent: Option<&str>, activity: Option<&str>| ExecutionRow {
            id: id.to_string(),
            process_instance_id: "pi-1".to_string(),
            parent_id: parent.map(str::to_string),
            activity_id: activity.map(str::to_string),
            active: activity.is_some(),
            is_scope: activity.is_none(),
            multi_instance_root: false,
            sub_process_instance_id: None,
            local_variables: Value::Null,
            assignee: None,
            owner: None,
        };

        let state = row.into_state(vec![
            execution("pi-1", None, None),
            execution("e1", Some("pi-1"), Some("taskA")),
        ]);
        assert_eq!(state.revision, 4);
        assert_eq!(state.variables.get("amount"), Some(&json!(10)));
        assert!(state.executions[0].is_root());
        assert_eq!(state.active_activity_ids(), vec!["taskA"]);
    }
}
