//! History definition-ref propagation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::{HistoryRefUpdate, PendingWrites};

/// Detail level of recorded history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryLevel {
    None,
    Activity,
    #[default]
    Audit,
    Full,
}

impl std::fmt::Display for HistoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HistoryLevel::None => "none",
            HistoryLevel::Activity => "activity",
            HistoryLevel::Audit => "audit",
            HistoryLevel::Full => "full",
        };
        write!(f, "{}", s)
    }
}

/// Stages definition-ref updates of historical records.
#[derive(Debug, Clone, Copy)]
pub struct HistoryRecorder {
    level: HistoryLevel,
}

impl HistoryRecorder {
    pub fn new(level: HistoryLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> HistoryLevel {
        self.level
    }

    /// Point the instance's history at the new definition. Only recorded
    /// from the `activity` level upwards.
    pub fn update_definition_ref(&self, writes: &mut PendingWrites, instance_id: &str, definition_id: &str) -> bool {
        if self.level < HistoryLevel::Activity {
            return false;
        }
        debug!(
            instance_id = %instance_id,
            definition_id = %definition_id,
            history_level = %self.level,
            "Updating history definition refs"
        );
        writes.history_refs.push(HistoryRefUpdate {
            instance_id: instance_id.to_string(),
            definition_id: definition_id.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(HistoryLevel::None < HistoryLevel::Activity);
        assert!(HistoryLevel::Audit > HistoryLevel::Activity);
        assert_eq!(HistoryLevel::default(), HistoryLevel::Audit);
    }

    #[test]
    fn test_gated_on_activity_level() {
        let mut writes = PendingWrites::default();
        assert!(!HistoryRecorder::new(HistoryLevel::None).update_definition_ref(&mut writes, "pi", "P2"));
        assert!(writes.history_refs.is_empty());

        assert!(HistoryRecorder::new(HistoryLevel::Activity).update_definition_ref(&mut writes, "pi", "P2"));
        assert_eq!(writes.history_refs.len(), 1);
    }

    #[test]
    fn test_parse_level() {
        let level: HistoryLevel = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(level, HistoryLevel::Full);
    }
}
