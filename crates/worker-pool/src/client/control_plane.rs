//! Control plane HTTP client.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of executing one job, as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Done,
    Retry {
        reason: String,
    },
    Reschedule {
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
}

/// Request giving up on a job.
#[derive(Debug, Clone, Serialize)]
struct DeadLetterRequest<'a> {
    message: &'a serde_json::Value,
    reason: &'a str,
}

/// HTTP client for control plane API.
#[derive(Clone)]
pub struct ControlPlaneClient {
    client: reqwest::Client,
    server_url: String,
}

impl ControlPlaneClient {
    /// Create a new control plane client.
    pub fn new(server_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    /// Execute a job message on the control plane.
    pub async fn execute_job(&self, message: &serde_json::Value) -> Result<JobOutcome> {
        let response = self
            .client
            .post(format!("{}/api/jobs/execute", self.server_url))
            .json(message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to execute job: status {}: {}", status, body);
        }

        let outcome: JobOutcome = response.json().await?;
        Ok(outcome)
    }

    /// Give up on a job whose retries are exhausted.
    pub async fn dead_letter(&self, message: &serde_json::Value, reason: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/api/jobs/dead-letter", self.server_url))
            .json(&DeadLetterRequest { message, reason })
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to dead-letter job: {}", body);
        }

        Ok(())
    }

    /// Dead-letter with retry; losing the call would leave the part IN_PROGRESS.
    pub async fn dead_letter_with_retry(
        &self,
        message: &serde_json::Value,
        reason: &str,
        max_retries: u32,
    ) -> Result<()> {
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=max_retries {
            match self.dead_letter(message, reason).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_retries => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries,
                        error = %e,
                        "Dead-letter call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(10));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_deserialization() {
        let outcome: JobOutcome = serde_json::from_str(r#"{"outcome":"done"}"#).unwrap();
        assert_eq!(outcome, JobOutcome::Done);

        let outcome: JobOutcome =
            serde_json::from_str(r#"{"outcome":"reschedule","delayMs":10000}"#).unwrap();
        assert_eq!(outcome, JobOutcome::Reschedule { delay_ms: 10000 });

        let outcome: JobOutcome =
            serde_json::from_str(r#"{"outcome":"retry","reason":"revision 3"}"#).unwrap();
        assert!(matches!(outcome, JobOutcome::Retry { .. }));
    }

    #[test]
    fn test_client_creation() {
        let client = ControlPlaneClient::new("http://localhost:8083/", Duration::from_secs(30));
        assert_eq!(client.server_url, "http://localhost:8083");
    }
}
