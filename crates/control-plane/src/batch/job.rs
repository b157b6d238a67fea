//! Job messages exchanged between the coordinator and job executors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Self-contained unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobMessage {
    /// Migrate the instance of one batch part
    MigratePart {
        #[serde(rename = "batchPartId")]
        batch_part_id: String,
    },
    /// Recompute the status of a batch
    BatchStatus {
        #[serde(rename = "batchId")]
        batch_id: String,
    },
}

impl JobMessage {
    pub fn migrate_part(batch_part_id: impl Into<String>) -> Self {
        JobMessage::MigratePart {
            batch_part_id: batch_part_id.into(),
        }
    }

    pub fn batch_status(batch_id: impl Into<String>) -> Self {
        JobMessage::BatchStatus {
            batch_id: batch_id.into(),
        }
    }
}

/// Envelope delivered to job executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: String,
    pub message: JobMessage,
    /// Failed attempts so far
    #[serde(default)]
    pub retries: u32,
    /// Re-arm interval of recurring jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_ms: Option<u64>,
}

impl ScheduledJob {
    pub fn once(message: JobMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message,
            retries: 0,
            cycle_ms: None,
        }
    }

    pub fn recurring(message: JobMessage, cycle: Duration) -> Self {
        Self {
            cycle_ms: Some(cycle.as_millis() as u64),
            ..Self::once(message)
        }
    }

    pub fn cycle(&self) -> Option<Duration> {
        self.cycle_ms.map(Duration::from_millis)
    }
}

/// What the executor of a job asks its scheduler to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Done,
    /// Transient failure, run again
    Retry { reason: String },
    /// Run again after the delay
    Reschedule {
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
}
