//! Mapping resolution.
//!
//! Computes the one authoritative decision per running execution of an
//! instance. Unmapped activities are auto-mapped to the same id, explicit
//! mappings are applied in document order, multi-instance containers are
//! moved as a whole and call activities either stay or are emptied into
//! the parent process. Any activity left without a decision fails the
//! migration.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{AppError, AppResult};
use crate::migration::context::MigrationContext;
use crate::migration::document::{ActivityMigrationMapping, MappingKind, MigrationDocument};
use crate::migration::rules;
use crate::migration::validator::{running_children, MappingIndex};
use crate::model::{ActivityKind, ProcessModel};
use crate::runtime::InstanceState;

/// Process a resolved mapping moves executions within.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingScope {
    /// The migrated instance
    Main,
    /// A sub-process instance whose executions move to the migrated instance
    SubProcessInstance {
        instance_id: String,
        call_activity_execution_id: String,
    },
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingSource {
    Auto,
    /// Index of the mapping in the document
    Explicit { index: usize },
}

/// Call activity entered to reach the targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallActivityEntry {
    pub call_activity_id: String,
    pub definition_id: String,
}

/// Decision for one unit of executions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMapping {
    pub scope: MappingScope,
    pub source: MappingSource,
    pub from_activity_ids: Vec<String>,
    /// Executions moved; multi-instance roots stand for their whole subtree
    pub execution_ids: Vec<String>,
    pub to_activity_ids: Vec<String>,
    pub call_activity_entry: Option<CallActivityEntry>,
    pub new_assignee: Option<String>,
    pub new_owner: Option<String>,
}

/// Outcome of resolving a document against one instance.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub mappings: Vec<ResolvedMapping>,
    /// Call activity executions whose children all move to this instance
    pub emptied_call_executions: Vec<String>,
    pub enable_activity_ids: Vec<String>,
}

/// Executions moved as one unit for an activity: the multi-instance roots
/// when the activity is multi-instance, its active executions otherwise.
pub fn unit_executions(instance: &InstanceState, model: &ProcessModel, activity_id: &str) -> Vec<String> {
    if model.is_multi_instance(activity_id) {
        instance
            .executions
            .iter()
            .filter(|e| e.is_at(activity_id) && e.multi_instance_root)
            .map(|e| e.id.clone())
            .collect()
    } else {
        instance
            .mappable_executions(model)
            .filter(|e| e.is_at(activity_id))
            .map(|e| e.id.clone())
            .collect()
    }
}

struct Pending(Vec<String>);

impl Pending {
    fn insert(&mut self, id: &str) {
        if !self.contains(id) {
            self.0.push(id.to_string());
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|p| p == id)
    }

    fn remove(&mut self, id: &str) {
        self.0.retain(|p| p != id);
    }
}

/// Resolve a document against one instance.
pub fn resolve(ctx: &MigrationContext, doc: &MigrationDocument) -> AppResult<Resolution> {
    let instance = ctx.instance();
    let current = ctx.current();
    let target = ctx.target();
    let index = MappingIndex::new(doc.mappings());
    let running = instance.running_activity_ids(current);

    let mut resolution = Resolution::default();
    let mut pending = Pending(Vec::new());
    let mut auto_containers: HashSet<&str> = HashSet::new();

    for activity_id in &running {
        let multi_instance_parents = current.multi_instance_ancestors(activity_id);
        if let Some(nearest) = multi_instance_parents.first() {
            if index.main.contains_key(activity_id.as_str()) {
                return Err(AppError::Migration(rules::individual_multi_instance_mapping(
                    activity_id,
                    &nearest.id,
                )));
            }
            if let Some(container) = multi_instance_parents
                .iter()
                .find(|n| index.main.contains_key(n.id.as_str()))
            {
                pending.insert(&container.id);
                continue;
            }
            let outermost = &multi_instance_parents[multi_instance_parents.len() - 1].id;
            if auto_containers.insert(outermost.as_str()) {
                if let Some(message) = rules::auto_placement_violation(target, outermost) {
                    return Err(AppError::Migration(message));
                }
                push_auto(&mut resolution, instance, current, outermost);
            }
            continue;
        }

        if index.main.contains_key(activity_id.as_str()) {
            pending.insert(activity_id);
            continue;
        }

        if current.kind_of(activity_id) == Some(ActivityKind::CallActivity) {
            let children = running_children(ctx, activity_id);
            let all_children_mapped = index.has_children_mapped(activity_id)
                && children.iter().all(|(_, ids)| {
                    ids.iter()
                        .all(|child| index.sub.contains_key(&(activity_id.as_str(), child.as_str())))
                });
            if all_children_mapped {
                resolution.emptied_call_executions.extend(
                    instance
                        .mappable_executions(current)
                        .filter(|e| e.is_at(activity_id))
                        .map(|e| e.id.clone()),
                );
                continue;
            }
            if let Some(message) = rules::call_activity_mismatch(current, target, activity_id) {
                return Err(AppError::Migration(message));
            }
            push_auto(&mut resolution, instance, current, activity_id);
            continue;
        }

        if let Some(message) = rules::auto_placement_violation(target, activity_id) {
            return Err(AppError::Migration(message));
        }
        push_auto(&mut resolution, instance, current, activity_id);
    }

    for (position, mapping) in doc.mappings().iter().enumerate() {
        let source = MappingSource::Explicit { index: position };
        let from_label = mapping.from_activity_ids().join(", ");

        if let Some(call_activity_id) = mapping.from_call_activity_id.as_deref() {
            if index.main.contains_key(call_activity_id) {
                return Err(AppError::Migration(format!(
                    "Call activity '{}' cannot be mapped while its child activities are moved \
                     to the parent process",
                    call_activity_id
                )));
            }
            let children = running_children(ctx, call_activity_id);
            if children.is_empty() {
                continue;
            }
            for to in mapping.to_activity_ids() {
                if let Some(message) = rules::mapping_target_violation(target, &from_label, to) {
                    return Err(AppError::Migration(message));
                }
            }
            for (sub, _) in children {
                let Some(sub_model) = ctx.model_of(sub) else {
                    return Err(AppError::NotFound(format!(
                        "process definition {}",
                        sub.definition_id
                    )));
                };
                let Some(call_execution_id) = sub.super_execution_id.clone() else {
                    continue;
                };
                let scope = MappingScope::SubProcessInstance {
                    instance_id: sub.id.clone(),
                    call_activity_execution_id: call_execution_id,
                };
                let from: Vec<&str> = mapping.from_activity_ids();
                push_explicit(
                    &mut resolution,
                    scope,
                    source,
                    mapping,
                    &from,
                    |activity_id| unit_executions(sub, sub_model, activity_id),
                    None,
                );
            }
            continue;
        }

        let from: Vec<&str> = mapping
            .from_activity_ids()
            .into_iter()
            .filter(|f| pending.contains(f))
            .collect();
        if from.is_empty() {
            continue;
        }

        let (placement_model, entry) = match mapping.to_call_activity {
            Some(ref call) => {
                if target.kind_of(&call.call_activity_id) != Some(ActivityKind::CallActivity) {
                    return Err(AppError::Migration(format!(
                        "Call activity '{}' cannot be found in the process definition with id '{}'",
                        call.call_activity_id, target.id
                    )));
                }
                let called = ctx
                    .called_model(&call.call_activity_id)
                    .map_err(AppError::Migration)?;
                let entry = CallActivityEntry {
                    call_activity_id: call.call_activity_id.clone(),
                    definition_id: called.id.clone(),
                };
                (called, Some(entry))
            }
            None => (target, None),
        };
        for to in mapping.to_activity_ids() {
            if let Some(message) = rules::mapping_target_violation(placement_model, &from_label, to) {
                return Err(AppError::Migration(message));
            }
        }

        push_explicit(
            &mut resolution,
            MappingScope::Main,
            source,
            mapping,
            &from,
            |activity_id| unit_executions(instance, current, activity_id),
            entry,
        );
        for f in from {
            pending.remove(f);
        }
    }

    if !pending.0.is_empty() {
        return Err(AppError::Migration(format!(
            "Migration mapping missing for activity definition ids: {}",
            pending.0.join(", ")
        )));
    }

    for enable in doc.enable_activities() {
        if !target.contains(&enable.activity_id) {
            return Err(AppError::Migration(format!(
                "Activity '{}' to enable cannot be found in the process definition with id '{}'",
                enable.activity_id, target.id
            )));
        }
        resolution.enable_activity_ids.push(enable.activity_id.clone());
    }

    check_coverage(ctx, &resolution)?;
    Ok(resolution)
}

fn push_auto(resolution: &mut Resolution, instance: &InstanceState, model: &ProcessModel, activity_id: &str) {
    for execution_id in unit_executions(instance, model, activity_id) {
        resolution.mappings.push(ResolvedMapping {
            scope: MappingScope::Main,
            source: MappingSource::Auto,
            from_activity_ids: vec![activity_id.to_string()],
            execution_ids: vec![execution_id],
            to_activity_ids: vec![activity_id.to_string()],
            call_activity_entry: None,
            new_assignee: None,
            new_owner: None,
        });
    }
}

fn push_explicit<F>(
    resolution: &mut Resolution,
    scope: MappingScope,
    source: MappingSource,
    mapping: &ActivityMigrationMapping,
    from: &[&str],
    units: F,
    entry: Option<CallActivityEntry>,
) where
    F: Fn(&str) -> Vec<String>,
{
    let to: Vec<String> = mapping.to_activity_ids().iter().map(|s| s.to_string()).collect();
    let decision = |from_ids: Vec<String>, execution_ids: Vec<String>| ResolvedMapping {
        scope: scope.clone(),
        source,
        from_activity_ids: from_ids,
        execution_ids,
        to_activity_ids: to.clone(),
        call_activity_entry: entry.clone(),
        new_assignee: mapping.new_assignee().map(str::to_string),
        new_owner: mapping.new_owner().map(str::to_string),
    };

    match mapping.kind {
        MappingKind::OneToOne { .. } | MappingKind::OneToMany { .. } => {
            for activity_id in from {
                for execution_id in units(activity_id) {
                    resolution
                        .mappings
                        .push(decision(vec![activity_id.to_string()], vec![execution_id]));
                }
            }
        }
        MappingKind::ManyToOne { .. } => {
            let execution_ids: Vec<String> = from.iter().flat_map(|a| units(a)).collect();
            if !execution_ids.is_empty() {
                let from_ids = from.iter().map(|s| s.to_string()).collect();
                resolution.mappings.push(decision(from_ids, execution_ids));
            }
        }
    }
}

/// Every mappable execution of the instance is decided exactly once.
fn check_coverage(ctx: &MigrationContext, resolution: &Resolution) -> AppResult<()> {
    let instance = ctx.instance();
    let mut decided: HashMap<String, usize> = HashMap::new();

    let main_units = resolution
        .mappings
        .iter()
        .filter(|m| m.scope == MappingScope::Main)
        .flat_map(|m| m.execution_ids.iter())
        .chain(resolution.emptied_call_executions.iter());
    for unit in main_units {
        for execution_id in instance.subtree_ids(unit) {
            *decided.entry(execution_id).or_default() += 1;
        }
    }

    for execution in instance.mappable_executions(ctx.current()) {
        let count = decided.get(&execution.id).copied().unwrap_or(0);
        if count != 1 {
            return Err(AppError::Migration(format!(
                "Execution '{}' at activity '{}' resolved to {} mappings",
                execution.id,
                execution.activity_id.as_deref().unwrap_or_default(),
                count
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::fixtures::*;

    fn tasks_doc(mappings: Vec<ActivityMigrationMapping>) -> MigrationDocument {
        mappings
            .into_iter()
            .fold(MigrationDocument::builder().migrate_to_definition_id("tasks:2"), |b, m| {
                b.add_mapping(m)
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_explicit_mapping_takes_precedence_over_auto() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskC")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let resolution = resolve(
            &ctx,
            &tasks_doc(vec![ActivityMigrationMapping::one_to_one("taskC", "taskB")]),
        )
        .unwrap();

        assert_eq!(resolution.mappings.len(), 1);
        let decision = &resolution.mappings[0];
        assert_eq!(decision.source, MappingSource::Explicit { index: 0 });
        assert_eq!(decision.execution_ids, vec!["e1"]);
        assert_eq!(decision.to_activity_ids, vec!["taskB"]);
    }

    #[test]
    fn test_unmapped_activity_keeps_its_id() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskC")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let resolution = resolve(&ctx, &tasks_doc(vec![])).unwrap();

        assert_eq!(resolution.mappings.len(), 1);
        assert_eq!(resolution.mappings[0].source, MappingSource::Auto);
        assert_eq!(resolution.mappings[0].to_activity_ids, vec!["taskC"]);
    }

    #[test]
    fn test_unmapped_missing_activity_fails() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let err = resolve(&ctx, &tasks_doc(vec![])).unwrap_err();
        assert!(matches!(err, AppError::Migration(ref m) if m.contains("'taskA' is not mapped")));
    }

    #[test]
    fn test_many_to_one_is_a_single_decision() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA"), ("e2", "taskC")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let resolution = resolve(
            &ctx,
            &tasks_doc(vec![ActivityMigrationMapping::many_to_one(["taskA", "taskC"], "taskB")]),
        )
        .unwrap();

        assert_eq!(resolution.mappings.len(), 1);
        assert_eq!(resolution.mappings[0].execution_ids, vec!["e1", "e2"]);
    }

    #[test]
    fn test_multi_instance_container_moves_as_one_unit() {
        let ctx = context(
            multi_instance_running(),
            model("multi:1", MULTI_V1),
            model("multi:2", MULTI_V2),
        );
        let doc = MigrationDocument::builder()
            .migrate_to_definition_id("multi:2")
            .build()
            .unwrap();
        let resolution = resolve(&ctx, &doc).unwrap();

        assert_eq!(resolution.mappings.len(), 1);
        assert_eq!(resolution.mappings[0].execution_ids, vec!["mi"]);
        assert_eq!(resolution.mappings[0].from_activity_ids, vec!["review"]);
    }
}
