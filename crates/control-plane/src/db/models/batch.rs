//! Batch and batch part rows.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::batch::{Batch, BatchPart};
use crate::error::{AppError, AppResult};

/// Row of `migration.batch`.
#[derive(Debug, Clone, FromRow)]
pub struct BatchRow {
    pub id: String,
    pub batch_type: String,
    pub search_key: String,
    pub search_key2: String,
    pub status: String,
    pub document: serde_json::Value,
    pub status_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Row of `migration.batch_part`.
#[derive(Debug, Clone, FromRow)]
pub struct BatchPartRow {
    pub id: String,
    pub batch_id: String,
    pub scope_id: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = AppError;

    fn try_from(row: BatchRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            batch_type: row.batch_type,
            search_key: row.search_key,
            search_key2: row.search_key2,
            status: row.status.parse()?,
            document: row.document,
            status_job_id: row.status_job_id,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

impl TryFrom<BatchPartRow> for BatchPart {
    type Error = AppError;

    fn try_from(row: BatchPartRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            batch_id: row.batch_id,
            scope_id: row.scope_id,
            status: row.status.parse()?,
            error: row.error,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchPartStatus;

    #[test]
    fn test_unknown_part_status_is_rejected() {
        let row = BatchPartRow {
            id: "part-1".to_string(),
            batch_id: "b-1".to_string(),
            scope_id: "pi-1".to_string(),
            status: "FAILED".to_string(),
            error: Some("unmapped".to_string()),
            created_at: Utc::now(),
            completed_at: None,
        };
        let part = BatchPart::try_from(row.clone()).unwrap();
        assert_eq!(part.status, BatchPartStatus::Failed);

        let row = BatchPartRow {
            status: "PAUSED".to_string(),
            ..row
        };
        assert!(BatchPart::try_from(row).is_err());
    }
}
