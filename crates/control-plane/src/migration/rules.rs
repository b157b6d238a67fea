//! Structural rules shared by validation and resolution.
//!
//! Each rule returns the violation message, or `None` when the placement is
//! allowed. The validator collects these messages, the resolver fails on
//! the first one.

use crate::expression::is_expression;
use crate::model::{ActivityKind, ProcessModel};

/// Whether a running call activity can stay where it is without a mapping.
pub fn call_activity_mismatch(
    current: &ProcessModel,
    target: &ProcessModel,
    activity_id: &str,
) -> Option<String> {
    let Some(target_node) = target.activity(activity_id) else {
        return Some(format!(
            "Call activity '{}' does not exist in the new model. It must be mapped explicitly \
             for migration (or all its child activities)",
            activity_id
        ));
    };
    if target_node.kind != ActivityKind::CallActivity {
        return Some(format!(
            "Call activity '{}' is a {} in the new model. It must be mapped explicitly for \
             migration (or all its child activities)",
            activity_id, target_node.kind
        ));
    }

    let current_element = current
        .activity(activity_id)
        .and_then(|n| n.called_element.as_deref());
    let target_element = target_node.called_element.as_deref();
    if !same_called_element(current_element, target_element) {
        return Some(format!(
            "Call activity '{}' has a different called element in the new model. It must be \
             mapped explicitly for migration (or all its child activities)",
            activity_id
        ));
    }

    if current.is_multi_instance(activity_id) != target_node.is_multi_instance() {
        return Some(format!(
            "Call activity '{}' has a different Multi-Instance configuration in the new model. \
             It must be mapped explicitly for migration (or all its child activities)",
            activity_id
        ));
    }

    None
}

/// Expressions never compare equal, even when textually identical.
fn same_called_element(current: Option<&str>, target: Option<&str>) -> bool {
    match (current, target) {
        (Some(a), Some(b)) => !is_expression(a) && !is_expression(b) && a == b,
        _ => false,
    }
}

/// Whether an unmapped activity can keep its id in the target model.
pub fn auto_placement_violation(target: &ProcessModel, activity_id: &str) -> Option<String> {
    if !target.contains(activity_id) {
        return Some(format!(
            "Activity '{}' is not mapped for migration (or its Multi-Instance parent)",
            activity_id
        ));
    }
    arbitrary_multi_instance_placement(target, activity_id).map(|container| {
        format!(
            "Activity '{}' cannot migrate arbitrarily inside a Multi Instance container '{}' \
             in the process definition with id '{}'",
            activity_id, container, target.id
        )
    })
}

/// Whether a mapping may place an execution at `to` in `model`.
pub fn mapping_target_violation(model: &ProcessModel, from: &str, to: &str) -> Option<String> {
    if !model.contains(to) {
        return Some(format!(
            "Invalid mapping for '{}' to '{}', cannot be found in the process definition with id '{}'",
            from, to, model.id
        ));
    }
    arbitrary_multi_instance_placement(model, to).map(|container| {
        format!(
            "Invalid mapping for '{}' to '{}', cannot migrate arbitrarily inside a Multi Instance \
             container '{}' inside process definition with id '{}'",
            from, to, container, model.id
        )
    })
}

fn arbitrary_multi_instance_placement(model: &ProcessModel, activity_id: &str) -> Option<String> {
    model
        .multi_instance_ancestors(activity_id)
        .first()
        .map(|container| container.id.clone())
}

/// Message for a source activity mapped individually inside a multi-instance container.
pub fn individual_multi_instance_mapping(activity_id: &str, container: &str) -> String {
    format!(
        "Activity '{}' is inside Multi Instance container '{}' and cannot be mapped individually, \
         map the container instead",
        activity_id, container
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_model;

    fn model(called: &str, multi: bool) -> ProcessModel {
        let mi = if multi { "\n    multiInstance: { cardinality: \"2\" }" } else { "" };
        parse_model(&format!(
            "key: p\nactivities:\n  - id: callX\n    type: call_activity\n    calledElement: \"{}\"{}\n",
            called, mi
        ))
        .unwrap()
    }

    #[test]
    fn test_equal_call_activities_pass() {
        assert!(call_activity_mismatch(&model("procA", false), &model("procA", false), "callX").is_none());
    }

    #[test]
    fn test_different_called_element() {
        let msg = call_activity_mismatch(&model("procA", false), &model("procB", false), "callX").unwrap();
        assert!(msg.contains("different called element"));
    }

    #[test]
    fn test_expressions_never_equal() {
        let msg =
            call_activity_mismatch(&model("${key}", false), &model("${key}", false), "callX").unwrap();
        assert!(msg.contains("different called element"));
    }

    #[test]
    fn test_multi_instance_mismatch() {
        let msg = call_activity_mismatch(&model("procA", false), &model("procA", true), "callX").unwrap();
        assert!(msg.contains("Multi-Instance"));
    }

    #[test]
    fn test_mapping_into_multi_instance_rejected() {
        let target = parse_model(
            r#"
id: P2
key: p
activities:
  - { id: loop, type: sub_process, multiInstance: { cardinality: "3" } }
  - { id: inner, type: user_task, parent: loop }
"#,
        )
        .unwrap();
        assert!(mapping_target_violation(&target, "a", "loop").is_none());
        let msg = mapping_target_violation(&target, "a", "inner").unwrap();
        assert!(msg.contains("Multi Instance container 'loop'"));
        assert!(mapping_target_violation(&target, "a", "nope").unwrap().contains("cannot be found"));
    }
}
