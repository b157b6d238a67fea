//! Migration API handlers.
//!
//! Request bodies are migration documents in their JSON wire format. The
//! body is parsed by the document itself so a malformed document is a
//! configuration error (400) rather than an extractor rejection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::batch::Batch;
use crate::error::AppError;
use crate::migration::{Diagnostic, MigrationDocument};
use crate::services::MigrationService;

/// Response for validate endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl From<Vec<Diagnostic>> for ValidationResponse {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            valid: diagnostics.is_empty(),
            diagnostics,
        }
    }
}

/// Response for a migrated instance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMigrationResponse {
    pub process_instance_id: String,
    pub status: String,
}

/// Response for a definition migrated in-line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionMigrationResponse {
    pub process_definition_id: String,
    pub migrated: usize,
}

fn parse_document(body: &str) -> Result<MigrationDocument, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::Config("Migration document is required".to_string()));
    }
    MigrationDocument::from_json(body)
}

/// Validate a migration document against one instance.
///
/// POST /api/migration/instances/{instance_id}/validate
pub async fn validate_instance(
    State(service): State<MigrationService>,
    Path(instance_id): Path<String>,
    body: String,
) -> Result<Json<ValidationResponse>, AppError> {
    let doc = parse_document(&body)?;
    let diagnostics = service.validate_instance(&instance_id, &doc).await?;
    Ok(Json(diagnostics.into()))
}

/// Migrate one instance.
///
/// POST /api/migration/instances/{instance_id}/migrate
pub async fn migrate_instance(
    State(service): State<MigrationService>,
    Path(instance_id): Path<String>,
    body: String,
) -> Result<Json<InstanceMigrationResponse>, AppError> {
    let doc = parse_document(&body)?;
    service.migrate_instance(&instance_id, &doc).await?;
    Ok(Json(InstanceMigrationResponse {
        process_instance_id: instance_id,
        status: "migrated".to_string(),
    }))
}

/// Validate a migration document against every instance of a definition.
///
/// POST /api/migration/definitions/{definition_id}/validate
pub async fn validate_definition(
    State(service): State<MigrationService>,
    Path(definition_id): Path<String>,
    body: String,
) -> Result<Json<ValidationResponse>, AppError> {
    let doc = parse_document(&body)?;
    let diagnostics = service.validate_definition(&definition_id, &doc).await?;
    Ok(Json(diagnostics.into()))
}

/// Migrate every instance of a definition in-line.
///
/// POST /api/migration/definitions/{definition_id}/migrate
pub async fn migrate_definition(
    State(service): State<MigrationService>,
    Path(definition_id): Path<String>,
    body: String,
) -> Result<Json<DefinitionMigrationResponse>, AppError> {
    let doc = parse_document(&body)?;
    let migrated = service.migrate_definition(&definition_id, &doc).await?;
    Ok(Json(DefinitionMigrationResponse {
        process_definition_id: definition_id,
        migrated,
    }))
}

/// Start an asynchronous batch migration of a definition.
///
/// POST /api/migration/definitions/{definition_id}/batch
pub async fn batch_migrate(
    State(service): State<MigrationService>,
    Path(definition_id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<Batch>), AppError> {
    let doc = parse_document(&body)?;
    let batch = service.batch_migrate(&definition_id, &doc).await?;
    Ok((StatusCode::ACCEPTED, Json(batch)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_is_configuration_error() {
        assert!(matches!(parse_document("  "), Err(AppError::Config(_))));
    }

    #[test]
    fn test_malformed_body_is_configuration_error() {
        assert!(matches!(parse_document("{\"activityMappings\": 3}"), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validation_response_valid_when_empty() {
        let response: ValidationResponse = Vec::new().into();
        assert!(response.valid);

        let response: ValidationResponse =
            vec![Diagnostic::new("pi-1", ["taskA"], "not mapped")].into();
        assert!(!response.valid);
        assert_eq!(response.diagnostics.len(), 1);
    }
}
