//! Batch and batch part records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Batch type of process migration batches.
pub const MIGRATION_BATCH_TYPE: &str = "processMigration";

/// Derived status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    InProgress,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::InProgress => "IN_PROGRESS",
            BatchStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(BatchStatus::InProgress),
            "COMPLETED" => Ok(BatchStatus::Completed),
            other => Err(AppError::Parse(format!("Unknown batch status: {}", other))),
        }
    }
}

/// Status of one per-instance unit of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchPartStatus {
    Waiting,
    InProgress,
    Completed,
    Failed,
}

impl BatchPartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchPartStatus::Waiting => "WAITING",
            BatchPartStatus::InProgress => "IN_PROGRESS",
            BatchPartStatus::Completed => "COMPLETED",
            BatchPartStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchPartStatus::Completed | BatchPartStatus::Failed)
    }
}

impl fmt::Display for BatchPartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchPartStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(BatchPartStatus::Waiting),
            "IN_PROGRESS" => Ok(BatchPartStatus::InProgress),
            "COMPLETED" => Ok(BatchPartStatus::Completed),
            "FAILED" => Ok(BatchPartStatus::Failed),
            other => Err(AppError::Parse(format!("Unknown batch part status: {}", other))),
        }
    }
}

/// Batch migration of the instances of one definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub batch_type: String,
    /// Source definition id
    pub search_key: String,
    /// Target definition id
    pub search_key2: String,
    pub status: BatchStatus,
    /// Migration document as submitted
    pub document: Value,
    /// Recurring status job, set once scheduled
    pub status_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Migration of one instance within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPart {
    pub id: String,
    pub batch_id: String,
    /// Process instance id
    pub scope_id: String,
    pub status: BatchPartStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchPart {
    pub fn waiting(batch_id: &str, instance_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            scope_id: instance_id.to_string(),
            status: BatchPartStatus::Waiting,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A batch is completed once every part is terminal.
pub fn derive_batch_status(parts: &[BatchPart]) -> BatchStatus {
    if parts.iter().all(|p| p.status.is_terminal()) {
        BatchStatus::Completed
    } else {
        BatchStatus::InProgress
    }
}

/// Outcome of one part as reported to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPartResult {
    pub id: String,
    pub process_instance_id: String,
    pub status: BatchPartStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Progress of a batch migration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMigrationResult {
    pub batch_id: String,
    pub source_process_definition_id: String,
    pub target_process_definition_id: String,
    pub status: BatchStatus,
    pub waiting: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub parts: Vec<BatchPartResult>,
}

impl BatchMigrationResult {
    pub fn new(batch: &Batch, parts: &[BatchPart]) -> Self {
        let count = |status: BatchPartStatus| parts.iter().filter(|p| p.status == status).count();
        Self {
            batch_id: batch.id.clone(),
            source_process_definition_id: batch.search_key.clone(),
            target_process_definition_id: batch.search_key2.clone(),
            status: derive_batch_status(parts),
            waiting: count(BatchPartStatus::Waiting),
            in_progress: count(BatchPartStatus::InProgress),
            completed: count(BatchPartStatus::Completed),
            failed: count(BatchPartStatus::Failed),
            parts: parts
                .iter()
                .map(|p| BatchPartResult {
                    id: p.id.clone(),
                    process_instance_id: p.scope_id.clone(),
                    status: p.status,
                    error: p.error.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(status: BatchPartStatus) -> BatchPart {
        BatchPart {
            status,
            ..BatchPart::waiting("b1", "pi-1")
        }
    }

    #[test]
    fn test_batch_in_progress_until_all_parts_terminal() {
        let parts = vec![part(BatchPartStatus::Completed), part(BatchPartStatus::InProgress)];
        assert_eq!(derive_batch_status(&parts), BatchStatus::InProgress);

        let parts = vec![part(BatchPartStatus::Completed), part(BatchPartStatus::Failed)];
        assert_eq!(derive_batch_status(&parts), BatchStatus::Completed);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!("FAILED".parse::<BatchPartStatus>().unwrap(), BatchPartStatus::Failed);
        assert_eq!(BatchStatus::InProgress.to_string(), "IN_PROGRESS");
        assert!("DONE".parse::<BatchStatus>().is_err());
        assert_eq!(
            serde_json::to_value(BatchPartStatus::InProgress).unwrap(),
            serde_json::json!("IN_PROGRESS")
        );
    }

    #[test]
    fn test_result_counts() {
        let batch = Batch {
            id: "b1".to_string(),
            batch_type: MIGRATION_BATCH_TYPE.to_string(),
            search_key: "p:1".to_string(),
            search_key2: "p:2".to_string(),
            status: BatchStatus::InProgress,
            document: Value::Null,
            status_job_id: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let parts = vec![
            part(BatchPartStatus::Completed),
            part(BatchPartStatus::Failed),
            part(BatchPartStatus::Waiting),
        ];
        let result = BatchMigrationResult::new(&batch, &parts);
        assert_eq!((result.waiting, result.completed, result.failed), (1, 1, 1));
        assert_eq!(result.status, BatchStatus::InProgress);
    }
}
