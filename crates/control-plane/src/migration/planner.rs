//! State transform planning.
//!
//! Turns resolved mappings into ordered move operations, one list per
//! scope: the migrated instance first, then every sub-process instance
//! whose executions move up to it. Planning performs no I/O.

use serde::Serialize;

use crate::migration::resolver::{CallActivityEntry, MappingScope, Resolution};

/// Shape of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    SingleToSingle,
    /// Fan-out, e.g. entering a parallel split
    SingleToMany,
    /// Fan-in, e.g. leaving a parallel join
    ManyToSingle,
}

/// One move of executions to activities.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOperation {
    pub kind: MoveKind,
    pub execution_ids: Vec<String>,
    pub from_activity_ids: Vec<String>,
    pub to_activity_ids: Vec<String>,
    pub new_assignee: Option<String>,
    pub new_owner: Option<String>,
    /// Targets are placed inside the process this call activity starts
    pub call_activity_entry: Option<CallActivityEntry>,
}

/// Moves applied within one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedPlan {
    pub scope: MappingScope,
    pub moves: Vec<MoveOperation>,
    pub enable_activity_ids: Vec<String>,
}

/// Ordered plan for one instance migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformPlan {
    pub scopes: Vec<ScopedPlan>,
    pub emptied_call_executions: Vec<String>,
}

impl TransformPlan {
    pub fn main(&self) -> Option<&ScopedPlan> {
        self.scopes.iter().find(|s| s.scope == MappingScope::Main)
    }

    pub fn move_count(&self) -> usize {
        self.scopes.iter().map(|s| s.moves.len()).sum()
    }
}

fn classify(executions: usize, targets: usize) -> MoveKind {
    if targets > 1 {
        MoveKind::SingleToMany
    } else if executions > 1 {
        MoveKind::ManyToSingle
    } else {
        MoveKind::SingleToSingle
    }
}

/// Build the transform plan of a resolution.
pub fn plan(resolution: &Resolution) -> TransformPlan {
    let mut scopes = vec![ScopedPlan {
        scope: MappingScope::Main,
        moves: Vec::new(),
        enable_activity_ids: resolution.enable_activity_ids.clone(),
    }];

    for mapping in &resolution.mappings {
        let operation = MoveOperation {
            kind: classify(mapping.execution_ids.len(), mapping.to_activity_ids.len()),
            execution_ids: mapping.execution_ids.clone(),
            from_activity_ids: mapping.from_activity_ids.clone(),
            to_activity_ids: mapping.to_activity_ids.clone(),
            new_assignee: mapping.new_assignee.clone(),
            new_owner: mapping.new_owner.clone(),
            call_activity_entry: mapping.call_activity_entry.clone(),
        };

        match scopes.iter_mut().find(|s| s.scope == mapping.scope) {
            Some(scoped) => scoped.moves.push(operation),
            None => scopes.push(ScopedPlan {
                scope: mapping.scope.clone(),
                moves: vec![operation],
                enable_activity_ids: Vec::new(),
            }),
        }
    }

    TransformPlan {
        scopes,
        emptied_call_executions: resolution.emptied_call_executions.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::resolver::{MappingSource, ResolvedMapping};

    fn mapping(scope: MappingScope, executions: &[&str], to: &[&str]) -> ResolvedMapping {
        ResolvedMapping {
            scope,
            source: MappingSource::Auto,
            from_activity_ids: vec!["a".to_string()],
            execution_ids: executions.iter().map(|s| s.to_string()).collect(),
            to_activity_ids: to.iter().map(|s| s.to_string()).collect(),
            call_activity_entry: None,
            new_assignee: None,
            new_owner: None,
        }
    }

    #[test]
    fn test_move_kinds() {
        assert_eq!(classify(1, 1), MoveKind::SingleToSingle);
        assert_eq!(classify(1, 3), MoveKind::SingleToMany);
        assert_eq!(classify(2, 1), MoveKind::ManyToSingle);
    }

    #[test]
    fn test_main_scope_first_then_sub_scopes() {
        let sub = MappingScope::SubProcessInstance {
            instance_id: "sub-1".to_string(),
            call_activity_execution_id: "call-1".to_string(),
        };
        let resolution = Resolution {
            mappings: vec![
                mapping(sub.clone(), &["s1"], &["taskP"]),
                mapping(MappingScope::Main, &["e1", "e2"], &["join"]),
                mapping(sub.clone(), &["s2"], &["taskQ", "taskR"]),
            ],
            emptied_call_executions: vec!["call-1".to_string()],
            enable_activity_ids: vec!["audit".to_string()],
        };

        let plan = plan(&resolution);
        assert_eq!(plan.scopes.len(), 2);
        assert_eq!(plan.scopes[0].scope, MappingScope::Main);
        assert_eq!(plan.scopes[0].moves[0].kind, MoveKind::ManyToSingle);
        assert_eq!(plan.scopes[0].enable_activity_ids, vec!["audit"]);
        assert_eq!(plan.scopes[1].scope, sub);
        assert_eq!(plan.scopes[1].moves.len(), 2);
        assert_eq!(plan.scopes[1].moves[1].kind, MoveKind::SingleToMany);
        assert_eq!(plan.move_count(), 3);
    }
}
