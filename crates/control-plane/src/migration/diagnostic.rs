use serde::{Deserialize, Serialize};

/// Structural finding of the validator. Never an error by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub instance_id: String,
    pub activity_ids: Vec<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new<I, S>(instance_id: &str, activity_ids: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instance_id: instance_id.to_string(),
            activity_ids: activity_ids.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    /// Prefix the message with the instance it belongs to.
    pub fn with_instance_prefix(mut self) -> Self {
        self.message = format!("Process instance '{}': {}", self.instance_id, self.message);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
