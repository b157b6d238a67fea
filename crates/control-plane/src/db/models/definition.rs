//! Process definition rows.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};
use crate::model::ProcessModel;

/// Row of `migration.process_definition`.
#[derive(Debug, Clone, FromRow)]
pub struct DefinitionRow {
    pub id: String,
    pub key: String,
    pub version: i32,
    pub tenant_id: Option<String>,
    /// Model document as deployed
    pub model: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DefinitionRow {
    /// Parse the stored model. Row columns win over the document's identity fields.
    pub fn into_model(self) -> AppResult<ProcessModel> {
        let mut model: ProcessModel = serde_json::from_value(self.model).map_err(|e| {
            AppError::Parse(format!("Invalid model of process definition {}: {}", self.id, e))
        })?;
        model.key = self.key;
        model.version = self.version;
        model.tenant_id = self.tenant_id;
        Ok(model.with_id(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_identity_overrides_document() {
        let row = DefinitionRow {
            id: "orders:3:abc".to_string(),
            key: "orders".to_string(),
            version: 3,
            tenant_id: Some("acme".to_string()),
            model: json!({
                "key": "orders",
                "activities": [{ "id": "review", "type": "user_task" }]
            }),
            created_at: Utc::now(),
        };
        let model = row.into_model().unwrap();
        assert_eq!(model.id, "orders:3:abc");
        assert_eq!(model.version, 3);
        assert_eq!(model.tenant_id.as_deref(), Some("acme"));
        assert!(model.contains("review"));
    }
}
