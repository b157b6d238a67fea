//! Process model parser.
//!
//! Parses YAML (or JSON) model documents into [`ProcessModel`] graphs and
//! checks their structure:
//! - activity ids are unique
//! - parents exist and are containers
//! - parent chains are acyclic
//! - call activities name a called element
//! - boundary events are attached to an existing activity

use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::model::types::{ActivityKind, ProcessModel};

/// Parse a YAML string into a ProcessModel.
pub fn parse_model(content: &str) -> AppResult<ProcessModel> {
    serde_yaml::from_str(content).map_err(|e| AppError::Parse(e.to_string()))
}

/// Validate a process model graph.
pub fn validate_model(model: &ProcessModel) -> AppResult<()> {
    if model.key.trim().is_empty() {
        return Err(AppError::Parse("Process model must have a key".to_string()));
    }

    for node in model.activities() {
        if let Some(ref parent) = node.parent {
            let Some(parent_node) = model.activity(parent) else {
                return Err(AppError::Parse(format!(
                    "Activity '{}': parent '{}' does not exist",
                    node.id, parent
                )));
            };
            if !parent_node.kind.is_container() {
                return Err(AppError::Parse(format!(
                    "Activity '{}': parent '{}' is a {} and cannot contain activities",
                    node.id, parent, parent_node.kind
                )));
            }
        }

        if node.kind == ActivityKind::CallActivity
            && node.called_element.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(AppError::Parse(format!(
                "Call activity '{}' must have a calledElement",
                node.id
            )));
        }

        if node.kind == ActivityKind::BoundaryEvent {
            match node.attached_to {
                Some(ref target) if model.contains(target) => {}
                Some(ref target) => {
                    return Err(AppError::Parse(format!(
                        "Boundary event '{}' is attached to unknown activity '{}'",
                        node.id, target
                    )));
                }
                None => {
                    return Err(AppError::Parse(format!(
                        "Boundary event '{}' must have attachedTo",
                        node.id
                    )));
                }
            }
        }

        check_acyclic(model, &node.id)?;
    }

    Ok(())
}

fn check_acyclic(model: &ProcessModel, id: &str) -> AppResult<()> {
    let mut seen = HashSet::new();
    let mut current = Some(id);
    while let Some(activity_id) = current {
        if !seen.insert(activity_id) {
            return Err(AppError::Parse(format!(
                "Activity '{}' is its own ancestor",
                id
            )));
        }
        current = model.activity(activity_id).and_then(|n| n.parent.as_deref());
    }
    Ok(())
}
