//! Database API handlers.
//!
//! Schema management for the `migration` schema.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::db::{schema, DbPool};
use crate::error::AppError;
use crate::state::AppState;

/// Response for database schema operations.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaOperationResponse {
    /// Operation status.
    pub status: String,

    /// Operation message.
    pub message: String,

    /// Whether every required table exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,

    /// List of missing tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

fn pool(state: &AppState) -> Result<&DbPool, AppError> {
    state
        .db
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("No database configured, running on the in-memory store".to_string()))
}

/// Initialize the database schema.
///
/// POST /api/db/init
pub async fn init_database(State(state): State<AppState>) -> Result<Json<SchemaOperationResponse>, AppError> {
    let pool = pool(&state)?;
    schema::init_schema(pool).await?;
    let missing = schema::missing_tables(pool).await?;

    Ok(Json(SchemaOperationResponse {
        status: "ok".to_string(),
        message: format!("Schema '{}' initialized", schema::SCHEMA_NAME),
        valid: Some(missing.is_empty()),
        missing: Some(missing),
    }))
}

/// Validate the database schema.
///
/// GET /api/db/validate
pub async fn validate_database(
    State(state): State<AppState>,
) -> Result<Json<SchemaOperationResponse>, AppError> {
    let pool = pool(&state)?;
    let missing = schema::missing_tables(pool).await?;
    let valid = missing.is_empty();

    Ok(Json(SchemaOperationResponse {
        status: "ok".to_string(),
        message: if valid {
            "Database schema is valid".to_string()
        } else {
            format!("Missing tables: {}", missing.join(", "))
        },
        valid: Some(valid),
        missing: Some(missing),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_response_serialization() {
        let response = SchemaOperationResponse {
            status: "ok".to_string(),
            message: "Database schema is valid".to_string(),
            valid: Some(true),
            missing: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["valid"], true);
        assert!(json.get("missing").is_none());
    }
}
