//! JSON wire format of migration documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::migration::document::{
    ActivityMigrationMapping, DefinitionTarget, EnableActivityMapping, MappingKind,
    MigrationDocument, MigrationHook,
};

/// Definition version given as a number or a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionValue {
    Number(i64),
    Text(String),
}

impl VersionValue {
    fn parse(&self, field: &str) -> AppResult<i32> {
        let parsed = match self {
            VersionValue::Number(n) => i32::try_from(*n).ok(),
            VersionValue::Text(s) => s.trim().parse::<i32>().ok(),
        };
        parsed.ok_or_else(|| AppError::Config(format!("Invalid {}: {:?}", field, self)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptJson {
    pub language: String,
    pub script: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMappingJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_activity_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_activity_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_call_activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_activity_process_definition_version: Option<VersionValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub to_parent_process: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_call_activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_new_assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_new_owner: Option<String>,
}

/// Serialized migration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDocumentJson {
    #[serde(default)]
    pub move_to_process_definition_id: Option<String>,
    #[serde(default)]
    pub move_to_process_definition_key: Option<String>,
    #[serde(default)]
    pub move_to_process_definition_version: Option<VersionValue>,
    #[serde(default)]
    pub move_to_process_definition_tenant_id: Option<String>,
    #[serde(default)]
    pub process_instance_ids_to_migrate: Vec<String>,
    #[serde(default)]
    pub activity_mappings: Vec<ActivityMappingJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_activity_mappings: Vec<EnableActivityMapping>,
    #[serde(default)]
    pub process_instance_variables: Map<String, Value>,
    #[serde(default)]
    pub activities_local_variables: BTreeMap<String, Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_upgrade_script: Option<ScriptJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_upgrade_script: Option<ScriptJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_upgrade_java_delegate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_upgrade_java_delegate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_upgrade_java_delegate_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_upgrade_java_delegate_expression: Option<String>,
}

impl TryFrom<ActivityMappingJson> for ActivityMigrationMapping {
    type Error = AppError;

    fn try_from(json: ActivityMappingJson) -> Result<Self, Self::Error> {
        let mut mapping = match (
            json.from_activity_id,
            json.from_activity_ids,
            json.to_activity_id,
            json.to_activity_ids,
        ) {
            (Some(from), None, Some(to), None) => ActivityMigrationMapping::one_to_one(from, to),
            (Some(from), None, None, Some(to)) => {
                if json.with_new_assignee.is_some() || json.with_new_owner.is_some() {
                    return Err(AppError::Config(format!(
                        "Mapping from '{}' to several activities cannot set an assignee or owner",
                        from
                    )));
                }
                ActivityMigrationMapping::one_to_many(from, to)
            }
            (None, Some(from), Some(to), None) => ActivityMigrationMapping::many_to_one(from, to),
            _ => {
                return Err(AppError::Config(
                    "Activity mapping needs fromActivityId or fromActivityIds and toActivityId \
                     or toActivityIds, and cannot map many activities to many"
                        .to_string(),
                ));
            }
        };

        if let Some(assignee) = json.with_new_assignee {
            mapping = mapping.with_new_assignee(assignee);
        }
        if let Some(owner) = json.with_new_owner {
            mapping = mapping.with_new_owner(owner);
        }

        if let Some(call_activity_id) = json.to_call_activity_id {
            let version = json
                .call_activity_process_definition_version
                .as_ref()
                .map(|v| v.parse("callActivityProcessDefinitionVersion"))
                .transpose()?;
            mapping = mapping.in_call_activity(call_activity_id, version);
        }

        match (json.to_parent_process, json.from_call_activity_id) {
            (true, Some(call_activity_id)) => mapping = mapping.to_parent_process(call_activity_id),
            (true, None) => {
                return Err(AppError::Config(
                    "toParentProcess mappings must name the fromCallActivityId".to_string(),
                ));
            }
            (false, Some(call_activity_id)) => {
                return Err(AppError::Config(format!(
                    "fromCallActivityId '{}' is only valid with toParentProcess",
                    call_activity_id
                )));
            }
            (false, None) => {}
        }

        Ok(mapping)
    }
}

impl From<ActivityMigrationMapping> for ActivityMappingJson {
    fn from(mapping: ActivityMigrationMapping) -> Self {
        let mut json = ActivityMappingJson::default();
        match mapping.kind {
            MappingKind::OneToOne {
                from,
                to,
                new_assignee,
                new_owner,
            } => {
                json.from_activity_id = Some(from);
                json.to_activity_id = Some(to);
                json.with_new_assignee = new_assignee;
                json.with_new_owner = new_owner;
            }
            MappingKind::OneToMany { from, to } => {
                json.from_activity_id = Some(from);
                json.to_activity_ids = Some(to);
            }
            MappingKind::ManyToOne {
                from,
                to,
                new_assignee,
                new_owner,
            } => {
                json.from_activity_ids = Some(from);
                json.to_activity_id = Some(to);
                json.with_new_assignee = new_assignee;
                json.with_new_owner = new_owner;
            }
        }
        if let Some(target) = mapping.to_call_activity {
            json.to_call_activity_id = Some(target.call_activity_id);
            json.call_activity_process_definition_version = target
                .definition_version
                .map(|v| VersionValue::Number(i64::from(v)));
        }
        if let Some(call_activity_id) = mapping.from_call_activity_id {
            json.to_parent_process = true;
            json.from_call_activity_id = Some(call_activity_id);
        }
        json
    }
}

impl TryFrom<MigrationDocumentJson> for MigrationDocument {
    type Error = AppError;

    fn try_from(json: MigrationDocumentJson) -> Result<Self, Self::Error> {
        let mut builder = MigrationDocument::builder();

        if let Some(id) = json.move_to_process_definition_id {
            builder = builder.migrate_to_definition_id(id);
        }
        let version = json
            .move_to_process_definition_version
            .as_ref()
            .map(|v| v.parse("moveToProcessDefinitionVersion"))
            .transpose()?;
        builder = builder.definition_key(json.move_to_process_definition_key, version);
        if let Some(tenant) = json.move_to_process_definition_tenant_id {
            builder = builder.tenant_id(tenant);
        }

        builder = builder.instance_ids(json.process_instance_ids_to_migrate);
        for mapping in json.activity_mappings {
            builder = builder.add_mapping(ActivityMigrationMapping::try_from(mapping)?);
        }
        for enable in json.enable_activity_mappings {
            builder = builder.enable_activity(enable.activity_id);
        }
        builder = builder.process_variables(json.process_instance_variables);
        for (activity_id, variables) in json.activities_local_variables {
            builder = builder.activity_local_variables(activity_id, variables);
        }

        if let Some(script) = json.pre_upgrade_script {
            builder = builder.pre_upgrade_script(script.language, script.script);
        }
        if let Some(name) = json.pre_upgrade_java_delegate {
            builder = builder.pre_upgrade_delegate(name);
        }
        if let Some(expression) = json.pre_upgrade_java_delegate_expression {
            builder = builder.pre_upgrade_delegate_expression(expression);
        }
        if let Some(script) = json.post_upgrade_script {
            builder = builder.post_upgrade_script(script.language, script.script);
        }
        if let Some(name) = json.post_upgrade_java_delegate {
            builder = builder.post_upgrade_delegate(name);
        }
        if let Some(expression) = json.post_upgrade_java_delegate_expression {
            builder = builder.post_upgrade_delegate_expression(expression);
        }

        builder.build()
    }
}

impl From<MigrationDocument> for MigrationDocumentJson {
    fn from(doc: MigrationDocument) -> Self {
        let mut json = MigrationDocumentJson::default();
        match doc.target().clone() {
            DefinitionTarget::Id(id) => json.move_to_process_definition_id = Some(id),
            DefinitionTarget::Key {
                key,
                version,
                tenant_id,
            } => {
                json.move_to_process_definition_key = Some(key);
                json.move_to_process_definition_version = Some(VersionValue::Text(version.to_string()));
                json.move_to_process_definition_tenant_id = tenant_id;
            }
        }
        json.process_instance_ids_to_migrate = doc.instance_ids().to_vec();
        json.activity_mappings = doc.mappings().iter().cloned().map(Into::into).collect();
        json.enable_activity_mappings = doc.enable_activities().to_vec();
        json.process_instance_variables = doc.process_variables().clone();
        json.activities_local_variables = doc.activity_local_variables().clone();

        match doc.pre_hook() {
            Some(MigrationHook::Script { language, script }) => {
                json.pre_upgrade_script = Some(ScriptJson {
                    language: language.clone(),
                    script: script.clone(),
                });
            }
            Some(MigrationHook::ClassDelegate(name)) => {
                json.pre_upgrade_java_delegate = Some(name.clone());
            }
            Some(MigrationHook::DelegateExpression(expression)) => {
                json.pre_upgrade_java_delegate_expression = Some(expression.clone());
            }
            None => {}
        }
        match doc.post_hook() {
            Some(MigrationHook::Script { language, script }) => {
                json.post_upgrade_script = Some(ScriptJson {
                    language: language.clone(),
                    script: script.clone(),
                });
            }
            Some(MigrationHook::ClassDelegate(name)) => {
                json.post_upgrade_java_delegate = Some(name.clone());
            }
            Some(MigrationHook::DelegateExpression(expression)) => {
                json.post_upgrade_java_delegate_expression = Some(expression.clone());
            }
            None => {}
        }
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::document::CallActivityTarget;

    #[test]
    fn test_parse_wire_document() {
        let doc = MigrationDocument::from_json(
            r#"{
                "moveToProcessDefinitionKey": "order",
                "moveToProcessDefinitionVersion": "3",
                "moveToProcessDefinitionTenantId": "acme",
                "activityMappings": [
                    {"fromActivityId": "taskA", "toActivityId": "taskB", "withNewAssignee": "kermit"},
                    {"fromActivityId": "fork", "toActivityIds": ["left", "right"]},
                    {"fromActivityIds": ["left", "right"], "toActivityId": "join"},
                    {"fromActivityId": "sub1", "toActivityId": "sub2",
                     "toCallActivityId": "callX", "callActivityProcessDefinitionVersion": 2},
                    {"fromActivityId": "inner", "toActivityId": "outer",
                     "toParentProcess": true, "fromCallActivityId": "callY"}
                ],
                "processInstanceVariables": {"migrated": true},
                "postUpgradeJavaDelegate": "auditDelegate"
            }"#,
        )
        .unwrap();

        assert_eq!(
            doc.target(),
            &DefinitionTarget::Key {
                key: "order".to_string(),
                version: 3,
                tenant_id: Some("acme".to_string()),
            }
        );
        let mappings = doc.mappings();
        assert_eq!(mappings[0].new_assignee(), Some("kermit"));
        assert!(matches!(mappings[1].kind, MappingKind::OneToMany { .. }));
        assert!(matches!(mappings[2].kind, MappingKind::ManyToOne { .. }));
        assert_eq!(
            mappings[3].to_call_activity,
            Some(CallActivityTarget {
                call_activity_id: "callX".to_string(),
                definition_version: Some(2),
            })
        );
        assert_eq!(mappings[4].from_call_activity_id.as_deref(), Some("callY"));
        assert_eq!(
            doc.post_hook(),
            Some(&MigrationHook::ClassDelegate("auditDelegate".to_string()))
        );
    }

    #[test]
    fn test_round_trip_preserves_document() {
        let doc = MigrationDocument::builder()
            .migrate_to_definition("order", 4)
            .add_mapping(ActivityMigrationMapping::many_to_one(["a", "b"], "c").with_new_owner("gonzo"))
            .enable_activity("audit")
            .pre_upgrade_script("rhai", "let x = 1;")
            .build()
            .unwrap();

        let json = doc.to_json().unwrap();
        assert!(json.contains(r#""moveToProcessDefinitionVersion":"4""#));
        assert_eq!(MigrationDocument::from_json(&json).unwrap(), doc);
    }

    #[test]
    fn test_missing_target_is_config_error() {
        let err = MigrationDocument::from_json(r#"{"activityMappings": []}"#).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("must be set"));
    }

    #[test]
    fn test_to_parent_requires_call_activity() {
        let err = MigrationDocument::from_json(
            r#"{"moveToProcessDefinitionId": "P2",
                "activityMappings": [{"fromActivityId": "a", "toActivityId": "b", "toParentProcess": true}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("fromCallActivityId"));
    }

    #[test]
    fn test_many_to_many_rejected() {
        let err = MigrationDocument::from_json(
            r#"{"moveToProcessDefinitionId": "P2",
                "activityMappings": [{"fromActivityIds": ["a"], "toActivityIds": ["b"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
