//! Batch API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::batch::BatchMigrationResult;
use crate::error::AppError;
use crate::services::MigrationService;

/// Get the aggregated result of a batch.
///
/// GET /api/migration/batches/{batch_id}
pub async fn get(
    State(service): State<MigrationService>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchMigrationResult>, AppError> {
    let result = service.batch_result(&batch_id).await?;
    Ok(Json(result))
}

/// Delete a batch and its parts. Part jobs still queued become no-ops.
///
/// DELETE /api/migration/batches/{batch_id}
pub async fn delete(
    State(service): State<MigrationService>,
    Path(batch_id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete_batch(&batch_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
