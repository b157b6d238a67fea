//! Mapping validation.
//!
//! Classifies a migration document against both models and the running
//! executions of one instance. Validation never fails and never mutates;
//! it returns the list of structural problems, empty when the instance
//! can be migrated.

use std::collections::{HashMap, HashSet};

use crate::migration::context::MigrationContext;
use crate::migration::diagnostic::Diagnostic;
use crate::migration::document::{ActivityMigrationMapping, MigrationDocument};
use crate::migration::rules;
use crate::model::{ActivityKind, ProcessModel};
use crate::runtime::InstanceState;

/// Mappings of a document split by the process they move executions out of.
pub(crate) struct MappingIndex<'d> {
    /// Source activity id to the first mapping moving it within the main process
    pub main: HashMap<&'d str, usize>,
    /// (call activity id, source activity id) to the first mapping moving a
    /// child of that call activity to the parent process
    pub sub: HashMap<(&'d str, &'d str), usize>,
    /// Source ids named by more than one main mapping
    pub duplicates: Vec<&'d str>,
}

impl<'d> MappingIndex<'d> {
    pub fn new(mappings: &'d [ActivityMigrationMapping]) -> Self {
        let mut main = HashMap::new();
        let mut sub = HashMap::new();
        let mut duplicates = Vec::new();

        for (index, mapping) in mappings.iter().enumerate() {
            for from in mapping.from_activity_ids() {
                match mapping.from_call_activity_id.as_deref() {
                    Some(call_activity_id) => {
                        sub.entry((call_activity_id, from)).or_insert(index);
                    }
                    None => {
                        if main.contains_key(from) {
                            duplicates.push(from);
                        } else {
                            main.insert(from, index);
                        }
                    }
                }
            }
        }

        Self {
            main,
            sub,
            duplicates,
        }
    }

    pub fn has_children_mapped(&self, call_activity_id: &str) -> bool {
        self.sub.keys().any(|(ca, _)| *ca == call_activity_id)
    }
}

/// Running child activities of a call activity, across all its sub-process
/// instances, as (instance, activity ids) pairs.
pub(crate) fn running_children<'c>(
    ctx: &'c MigrationContext,
    call_activity_id: &str,
) -> Vec<(&'c InstanceState, Vec<String>)> {
    ctx.instance()
        .executions
        .iter()
        .filter(|e| e.is_at(call_activity_id))
        .filter_map(|e| e.sub_process_instance_id.as_deref())
        .filter_map(|sub_id| ctx.snapshot.instance(sub_id))
        .filter_map(|sub| {
            let model = ctx.model_of(sub)?;
            Some((sub, sub.running_activity_ids(model)))
        })
        .collect()
}

/// Validate a document against one instance.
pub fn validate(ctx: &MigrationContext, doc: &MigrationDocument) -> Vec<Diagnostic> {
    let instance_id = ctx.instance_id();
    let current = ctx.current();
    let target = ctx.target();
    let index = MappingIndex::new(doc.mappings());
    let running = ctx.instance().running_activity_ids(current);
    let mut diagnostics = Vec::new();

    for duplicate in &index.duplicates {
        if running.iter().any(|r| r == duplicate) {
            diagnostics.push(Diagnostic::new(
                instance_id,
                [*duplicate],
                format!("Activity '{}' is mapped more than once", duplicate),
            ));
        }
    }

    // Sources covered by a mapping decision: running ids and their multi-instance containers
    let mut covered: HashSet<&str> = running.iter().map(String::as_str).collect();

    for activity_id in &running {
        let multi_instance_parents = current.multi_instance_ancestors(activity_id);
        if let Some(nearest) = multi_instance_parents.first() {
            covered.extend(multi_instance_parents.iter().map(|n| n.id.as_str()));
            if index.main.contains_key(activity_id.as_str()) {
                diagnostics.push(Diagnostic::new(
                    instance_id,
                    [activity_id.as_str()],
                    rules::individual_multi_instance_mapping(activity_id, &nearest.id),
                ));
                continue;
            }
            let container_mapped = multi_instance_parents
                .iter()
                .any(|n| index.main.contains_key(n.id.as_str()));
            if !container_mapped {
                let outermost = multi_instance_parents[multi_instance_parents.len() - 1];
                if let Some(message) = rules::auto_placement_violation(target, &outermost.id) {
                    diagnostics.push(Diagnostic::new(
                        instance_id,
                        [activity_id.as_str(), outermost.id.as_str()],
                        message,
                    ));
                }
            }
            continue;
        }

        if index.main.contains_key(activity_id.as_str()) {
            continue;
        }

        if current.kind_of(activity_id) == Some(ActivityKind::CallActivity) {
            if let Some(diagnostic) = validate_unmapped_call_activity(ctx, &index, activity_id) {
                diagnostics.push(diagnostic);
            }
            continue;
        }

        if let Some(message) = rules::auto_placement_violation(target, activity_id) {
            diagnostics.push(Diagnostic::new(instance_id, [activity_id.as_str()], message));
        }
    }

    for mapping in doc.mappings() {
        match mapping.from_call_activity_id.as_deref() {
            Some(call_activity_id) => {
                if !running.iter().any(|r| r == call_activity_id) {
                    continue;
                }
                if index.main.contains_key(call_activity_id) {
                    diagnostics.push(Diagnostic::new(
                        instance_id,
                        [call_activity_id],
                        format!(
                            "Call activity '{}' cannot be mapped while its child activities are \
                             moved to the parent process",
                            call_activity_id
                        ),
                    ));
                }
                check_targets(&mut diagnostics, instance_id, mapping, target);
            }
            None => {
                if !mapping.from_activity_ids().iter().any(|f| covered.contains(f)) {
                    continue;
                }
                match mapping.to_call_activity {
                    Some(ref call) => match ctx.called_model(&call.call_activity_id) {
                        Ok(called) => check_targets(&mut diagnostics, instance_id, mapping, called),
                        Err(message) => diagnostics.push(Diagnostic::new(
                            instance_id,
                            [call.call_activity_id.as_str()],
                            message,
                        )),
                    },
                    None => check_targets(&mut diagnostics, instance_id, mapping, target),
                }
            }
        }
    }

    for enable in doc.enable_activities() {
        if !target.contains(&enable.activity_id) {
            diagnostics.push(Diagnostic::new(
                instance_id,
                [enable.activity_id.as_str()],
                format!(
                    "Activity '{}' to enable cannot be found in the process definition with id '{}'",
                    enable.activity_id, target.id
                ),
            ));
        }
    }

    diagnostics
}

fn validate_unmapped_call_activity(
    ctx: &MigrationContext,
    index: &MappingIndex<'_>,
    call_activity_id: &str,
) -> Option<Diagnostic> {
    let children = running_children(ctx, call_activity_id);
    let unmapped: Vec<&str> = children
        .iter()
        .flat_map(|(_, ids)| ids.iter())
        .filter(|child| !index.sub.contains_key(&(call_activity_id, child.as_str())))
        .map(String::as_str)
        .collect();

    // Every running child leaves through a parent-process mapping
    if index.has_children_mapped(call_activity_id) && unmapped.is_empty() {
        return None;
    }

    rules::call_activity_mismatch(ctx.current(), ctx.target(), call_activity_id).map(|message| {
        let mut activity_ids = vec![call_activity_id.to_string()];
        activity_ids.extend(unmapped.iter().map(|s| s.to_string()));
        Diagnostic {
            instance_id: ctx.instance_id().to_string(),
            activity_ids,
            message,
        }
    })
}

fn check_targets(
    diagnostics: &mut Vec<Diagnostic>,
    instance_id: &str,
    mapping: &ActivityMigrationMapping,
    model: &ProcessModel,
) {
    let from = mapping.from_activity_ids().join(", ");
    for to in mapping.to_activity_ids() {
        if let Some(message) = rules::mapping_target_violation(model, &from, to) {
            diagnostics.push(Diagnostic::new(instance_id, [to], message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::document::ActivityMigrationMapping;
    use crate::migration::fixtures::*;

    fn doc(mappings: Vec<ActivityMigrationMapping>) -> MigrationDocument {
        mappings
            .into_iter()
            .fold(MigrationDocument::builder().migrate_to_definition_id("tasks:2"), |b, m| {
                b.add_mapping(m)
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_renamed_task_with_mapping_is_valid() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let found = validate(&ctx, &doc(vec![ActivityMigrationMapping::one_to_one("taskA", "taskB")]));
        assert!(found.is_empty(), "{:?}", found);
    }

    #[test]
    fn test_unmapped_missing_activity() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA"), ("e2", "taskC")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let found = validate(&ctx, &doc(vec![]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].activity_ids, vec!["taskA"]);
        assert!(found[0].message.contains("not mapped for migration"));
    }

    #[test]
    fn test_mapping_into_multi_instance_container_rejected() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let found = validate(&ctx, &doc(vec![ActivityMigrationMapping::one_to_one("taskA", "loopTask")]));
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("Multi Instance container 'loop'"));
    }

    #[test]
    fn test_multi_instance_child_cannot_be_mapped_alone() {
        let ctx = context(
            multi_instance_running(),
            model("multi:1", MULTI_V1),
            model("multi:2", MULTI_V2),
        );
        let document = MigrationDocument::builder()
            .migrate_to_definition_id("multi:2")
            .add_mapping(ActivityMigrationMapping::one_to_one("check", "after"))
            .build()
            .unwrap();
        let found = validate(&ctx, &document);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("cannot be mapped individually"));
    }

    #[test]
    fn test_multi_instance_container_auto_maps() {
        let ctx = context(
            multi_instance_running(),
            model("multi:1", MULTI_V1),
            model("multi:2", MULTI_V2),
        );
        let document = MigrationDocument::builder()
            .migrate_to_definition_id("multi:2")
            .build()
            .unwrap();
        assert!(validate(&ctx, &document).is_empty());
    }

    #[test]
    fn test_missing_enable_activity() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskC")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let document = MigrationDocument::builder()
            .migrate_to_definition_id("tasks:2")
            .enable_activity("ghost")
            .build()
            .unwrap();
        let found = validate(&ctx, &document);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("to enable cannot be found"));
    }

    #[test]
    fn test_duplicate_mapping_reported() {
        let ctx = context(
            instance("tasks:1", &[("e1", "taskA")]),
            model("tasks:1", TASKS_V1),
            model("tasks:2", TASKS_V2),
        );
        let found = validate(
            &ctx,
            &doc(vec![
                ActivityMigrationMapping::one_to_one("taskA", "taskB"),
                ActivityMigrationMapping::one_to_one("taskA", "taskC"),
            ]),
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("mapped more than once"));
    }
}
