//! Migration documents.
//!
//! A [`MigrationDocument`] is the immutable description of one migration
//! intent. It is assembled through [`MigrationDocumentBuilder`], which
//! rejects malformed intents before any instance is looked at.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::migration::json::MigrationDocumentJson;

/// Identity of the definition instances are moved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefinitionTarget {
    Id(String),
    Key {
        key: String,
        version: i32,
        tenant_id: Option<String>,
    },
}

impl std::fmt::Display for DefinitionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionTarget::Id(id) => write!(f, "id '{}'", id),
            DefinitionTarget::Key {
                key,
                version,
                tenant_id: Some(tenant),
            } => write!(f, "key '{}' version {} tenant '{}'", key, version, tenant),
            DefinitionTarget::Key { key, version, .. } => {
                write!(f, "key '{}' version {}", key, version)
            }
        }
    }
}

/// Call activity of the target model a mapping enters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallActivityTarget {
    pub call_activity_id: String,
    /// Version of the called definition; latest when absent
    pub definition_version: Option<i32>,
}

/// Shape of an activity mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingKind {
    OneToOne {
        from: String,
        to: String,
        new_assignee: Option<String>,
        new_owner: Option<String>,
    },
    OneToMany {
        from: String,
        to: Vec<String>,
    },
    ManyToOne {
        from: Vec<String>,
        to: String,
        new_assignee: Option<String>,
        new_owner: Option<String>,
    },
}

/// One explicit activity mapping of a migration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityMigrationMapping {
    pub kind: MappingKind,
    /// Targets live inside the process called by this call activity
    pub to_call_activity: Option<CallActivityTarget>,
    /// Sources live in the process called by this call activity and the
    /// targets in the calling (parent) process
    pub from_call_activity_id: Option<String>,
}

impl ActivityMigrationMapping {
    fn new(kind: MappingKind) -> Self {
        Self {
            kind,
            to_call_activity: None,
            from_call_activity_id: None,
        }
    }

    pub fn one_to_one(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(MappingKind::OneToOne {
            from: from.into(),
            to: to.into(),
            new_assignee: None,
            new_owner: None,
        })
    }

    pub fn one_to_many<I, S>(from: impl Into<String>, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MappingKind::OneToMany {
            from: from.into(),
            to: to.into_iter().map(Into::into).collect(),
        })
    }

    pub fn many_to_one<I, S>(from: I, to: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MappingKind::ManyToOne {
            from: from.into_iter().map(Into::into).collect(),
            to: to.into(),
            new_assignee: None,
            new_owner: None,
        })
    }

    /// Land the targets inside the process called by `call_activity_id`.
    pub fn in_call_activity(mut self, call_activity_id: impl Into<String>, version: Option<i32>) -> Self {
        self.to_call_activity = Some(CallActivityTarget {
            call_activity_id: call_activity_id.into(),
            definition_version: version,
        });
        self
    }

    /// Move the sources out of the process called by `call_activity_id`
    /// into the calling process.
    pub fn to_parent_process(mut self, call_activity_id: impl Into<String>) -> Self {
        self.from_call_activity_id = Some(call_activity_id.into());
        self
    }

    /// Assign user tasks created by this mapping. Ignored on one-to-many.
    pub fn with_new_assignee(mut self, assignee: impl Into<String>) -> Self {
        match self.kind {
            MappingKind::OneToOne {
                ref mut new_assignee, ..
            }
            | MappingKind::ManyToOne {
                ref mut new_assignee, ..
            } => *new_assignee = Some(assignee.into()),
            MappingKind::OneToMany { .. } => {}
        }
        self
    }

    /// Set the owner of user tasks created by this mapping. Ignored on one-to-many.
    pub fn with_new_owner(mut self, owner: impl Into<String>) -> Self {
        match self.kind {
            MappingKind::OneToOne {
                ref mut new_owner, ..
            }
            | MappingKind::ManyToOne {
                ref mut new_owner, ..
            } => *new_owner = Some(owner.into()),
            MappingKind::OneToMany { .. } => {}
        }
        self
    }

    pub fn from_activity_ids(&self) -> Vec<&str> {
        match &self.kind {
            MappingKind::OneToOne { from, .. } | MappingKind::OneToMany { from, .. } => {
                vec![from.as_str()]
            }
            MappingKind::ManyToOne { from, .. } => from.iter().map(String::as_str).collect(),
        }
    }

    pub fn to_activity_ids(&self) -> Vec<&str> {
        match &self.kind {
            MappingKind::OneToOne { to, .. } | MappingKind::ManyToOne { to, .. } => {
                vec![to.as_str()]
            }
            MappingKind::OneToMany { to, .. } => to.iter().map(String::as_str).collect(),
        }
    }

    pub fn new_assignee(&self) -> Option<&str> {
        match &self.kind {
            MappingKind::OneToOne { new_assignee, .. }
            | MappingKind::ManyToOne { new_assignee, .. } => new_assignee.as_deref(),
            MappingKind::OneToMany { .. } => None,
        }
    }

    pub fn new_owner(&self) -> Option<&str> {
        match &self.kind {
            MappingKind::OneToOne { new_owner, .. } | MappingKind::ManyToOne { new_owner, .. } => {
                new_owner.as_deref()
            }
            MappingKind::OneToMany { .. } => None,
        }
    }

    pub fn is_to_parent_process(&self) -> bool {
        self.from_call_activity_id.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "[{}] -> [{}]",
            self.from_activity_ids().join(", "),
            self.to_activity_ids().join(", ")
        )
    }
}

/// Script, delegate or delegate expression run before or after the transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationHook {
    Script { language: String, script: String },
    ClassDelegate(String),
    DelegateExpression(String),
}

/// Target activity that is additionally enabled, not mapped from anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableActivityMapping {
    pub activity_id: String,
}

/// Immutable migration intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MigrationDocumentJson", into = "MigrationDocumentJson")]
pub struct MigrationDocument {
    target: DefinitionTarget,
    instance_ids: Vec<String>,
    mappings: Vec<ActivityMigrationMapping>,
    enable_activities: Vec<EnableActivityMapping>,
    process_variables: Map<String, Value>,
    activity_local_variables: BTreeMap<String, Map<String, Value>>,
    pre_hook: Option<MigrationHook>,
    post_hook: Option<MigrationHook>,
}

impl MigrationDocument {
    pub fn builder() -> MigrationDocumentBuilder {
        MigrationDocumentBuilder::default()
    }

    /// Parse a document from its JSON wire format.
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Serialize the document to its JSON wire format.
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn target(&self) -> &DefinitionTarget {
        &self.target
    }

    /// Instances a definition-wide migration is restricted to; empty means all.
    pub fn instance_ids(&self) -> &[String] {
        &self.instance_ids
    }

    /// Explicit mappings in document order.
    pub fn mappings(&self) -> &[ActivityMigrationMapping] {
        &self.mappings
    }

    pub fn enable_activities(&self) -> &[EnableActivityMapping] {
        &self.enable_activities
    }

    pub fn process_variables(&self) -> &Map<String, Value> {
        &self.process_variables
    }

    pub fn activity_local_variables(&self) -> &BTreeMap<String, Map<String, Value>> {
        &self.activity_local_variables
    }

    pub fn pre_hook(&self) -> Option<&MigrationHook> {
        self.pre_hook.as_ref()
    }

    pub fn post_hook(&self) -> Option<&MigrationHook> {
        self.post_hook.as_ref()
    }
}

/// Builder for [`MigrationDocument`].
#[derive(Debug, Clone, Default)]
pub struct MigrationDocumentBuilder {
    definition_id: Option<String>,
    definition_key: Option<String>,
    definition_version: Option<i32>,
    tenant_id: Option<String>,
    instance_ids: Vec<String>,
    mappings: Vec<ActivityMigrationMapping>,
    enable_activities: Vec<EnableActivityMapping>,
    process_variables: Map<String, Value>,
    activity_local_variables: BTreeMap<String, Map<String, Value>>,
    pre_hooks: Vec<MigrationHook>,
    post_hooks: Vec<MigrationHook>,
}

impl MigrationDocumentBuilder {
    pub fn migrate_to_definition_id(mut self, id: impl Into<String>) -> Self {
        self.definition_id = Some(id.into());
        self
    }

    pub fn migrate_to_definition(mut self, key: impl Into<String>, version: i32) -> Self {
        self.definition_key = Some(key.into());
        self.definition_version = Some(version);
        self
    }

    pub(crate) fn definition_key(mut self, key: Option<String>, version: Option<i32>) -> Self {
        self.definition_key = key;
        self.definition_version = version;
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn instance_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instance_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn add_mapping(mut self, mapping: ActivityMigrationMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn enable_activity(mut self, activity_id: impl Into<String>) -> Self {
        self.enable_activities.push(EnableActivityMapping {
            activity_id: activity_id.into(),
        });
        self
    }

    pub fn process_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.process_variables.insert(name.into(), value);
        self
    }

    pub fn process_variables(mut self, variables: Map<String, Value>) -> Self {
        self.process_variables.extend(variables);
        self
    }

    pub fn activity_local_variables(
        mut self,
        activity_id: impl Into<String>,
        variables: Map<String, Value>,
    ) -> Self {
        self.activity_local_variables
            .entry(activity_id.into())
            .or_default()
            .extend(variables);
        self
    }

    pub fn pre_upgrade_script(mut self, language: impl Into<String>, script: impl Into<String>) -> Self {
        self.pre_hooks.push(MigrationHook::Script {
            language: language.into(),
            script: script.into(),
        });
        self
    }

    pub fn post_upgrade_script(mut self, language: impl Into<String>, script: impl Into<String>) -> Self {
        self.post_hooks.push(MigrationHook::Script {
            language: language.into(),
            script: script.into(),
        });
        self
    }

    pub fn pre_upgrade_delegate(mut self, name: impl Into<String>) -> Self {
        self.pre_hooks.push(MigrationHook::ClassDelegate(name.into()));
        self
    }

    pub fn post_upgrade_delegate(mut self, name: impl Into<String>) -> Self {
        self.post_hooks.push(MigrationHook::ClassDelegate(name.into()));
        self
    }

    pub fn pre_upgrade_delegate_expression(mut self, expression: impl Into<String>) -> Self {
        self.pre_hooks
            .push(MigrationHook::DelegateExpression(expression.into()));
        self
    }

    pub fn post_upgrade_delegate_expression(mut self, expression: impl Into<String>) -> Self {
        self.post_hooks
            .push(MigrationHook::DelegateExpression(expression.into()));
        self
    }

    /// Build the document, rejecting malformed intents.
    pub fn build(self) -> AppResult<MigrationDocument> {
        let target = match (self.definition_id, self.definition_key) {
            (Some(_), Some(_)) => {
                return Err(AppError::Config(
                    "Only one of process definition id or key can be set as migration target"
                        .to_string(),
                ));
            }
            (None, None) => {
                return Err(AppError::Config(
                    "Process definition id or key must be set as migration target".to_string(),
                ));
            }
            (Some(id), None) if id.trim().is_empty() => {
                return Err(AppError::Config(
                    "Process definition id must not be empty".to_string(),
                ));
            }
            (Some(id), None) => DefinitionTarget::Id(id),
            (None, Some(key)) => {
                let Some(version) = self.definition_version else {
                    return Err(AppError::Config(format!(
                        "Process definition version must be set together with key '{}'",
                        key
                    )));
                };
                DefinitionTarget::Key {
                    key,
                    version,
                    tenant_id: self.tenant_id,
                }
            }
        };

        for mapping in &self.mappings {
            validate_mapping(mapping)?;
        }

        for enable in &self.enable_activities {
            if enable.activity_id.trim().is_empty() {
                return Err(AppError::Config(
                    "Enabled activity id must not be empty".to_string(),
                ));
            }
        }

        let pre_hook = single_hook(self.pre_hooks, "pre")?;
        let post_hook = single_hook(self.post_hooks, "post")?;

        Ok(MigrationDocument {
            target,
            instance_ids: self.instance_ids,
            mappings: self.mappings,
            enable_activities: self.enable_activities,
            process_variables: self.process_variables,
            activity_local_variables: self.activity_local_variables,
            pre_hook,
            post_hook,
        })
    }
}

fn validate_mapping(mapping: &ActivityMigrationMapping) -> AppResult<()> {
    let from = mapping.from_activity_ids();
    let to = mapping.to_activity_ids();
    if from.is_empty() || from.iter().any(|id| id.trim().is_empty()) {
        return Err(AppError::Config(format!(
            "Mapping {} has an empty source activity",
            mapping.describe()
        )));
    }
    if to.is_empty() || to.iter().any(|id| id.trim().is_empty()) {
        return Err(AppError::Config(format!(
            "Mapping {} has an empty target activity",
            mapping.describe()
        )));
    }
    if mapping.to_call_activity.is_some() && mapping.from_call_activity_id.is_some() {
        return Err(AppError::Config(format!(
            "Mapping {} cannot move to a parent process and into a call activity at the same time",
            mapping.describe()
        )));
    }
    Ok(())
}

fn single_hook(mut hooks: Vec<MigrationHook>, side: &str) -> AppResult<Option<MigrationHook>> {
    if hooks.len() > 1 {
        return Err(AppError::Config(format!(
            "Only one {}-upgrade hook can be set, found {}",
            side,
            hooks.len()
        )));
    }
    let hook = hooks.pop();
    if let Some(MigrationHook::Script { ref language, .. }) = hook {
        if !language.eq_ignore_ascii_case("rhai") {
            return Err(AppError::Config(format!(
                "Unsupported {}-upgrade script language '{}'",
                side, language
            )));
        }
    }
    Ok(hook)
}
