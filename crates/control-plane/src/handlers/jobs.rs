//! Job API handlers.
//!
//! Entry points for out-of-process workers consuming job messages from
//! NATS JetStream. The worker decides ack, nak or re-arm from the outcome.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::batch::{JobMessage, JobOutcome};
use crate::error::AppError;
use crate::services::MigrationService;

/// Request for giving up on a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRequest {
    pub message: JobMessage,
    pub reason: String,
}

/// Execute one job message.
///
/// POST /api/jobs/execute
///
/// Always answers 200; failures travel in the outcome.
pub async fn execute(
    State(service): State<MigrationService>,
    Json(message): Json<JobMessage>,
) -> Json<JobOutcome> {
    tracing::debug!(job = ?message, "Executing job from worker");
    Json(service.execute_job(&message).await)
}

/// Mark the batch part of a job as failed after retries are exhausted.
///
/// POST /api/jobs/dead-letter
pub async fn dead_letter(
    State(service): State<MigrationService>,
    Json(request): Json<DeadLetterRequest>,
) -> Result<StatusCode, AppError> {
    service.dead_letter(&request.message, &request.reason).await?;
    Ok(StatusCode::NO_CONTENT)
}
