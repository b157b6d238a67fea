//! NATS JetStream job scheduler.
//!
//! Job envelopes are published to a JetStream subject; migration workers
//! consume them and execute each job through the control plane API. The
//! control plane keeps no reference to in-flight jobs, only their ids.

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use std::time::Duration;

use crate::batch::{JobMessage, JobScheduler, ScheduledJob};
use crate::error::{AppError, AppResult};

/// Default NATS subject for job envelopes.
pub const DEFAULT_SUBJECT: &str = "migration.jobs";

/// Default JetStream stream name.
pub const DEFAULT_STREAM: &str = "migration_jobs";

/// Publishes batch jobs to JetStream.
#[derive(Clone)]
pub struct NatsJobScheduler {
    js: Context,
    subject: String,
}

impl NatsJobScheduler {
    /// Create a scheduler on an existing client, creating the stream when missing.
    pub async fn new(client: async_nats::Client, subject: &str, stream: &str) -> AppResult<Self> {
        let js = jetstream::new(client);
        Self::ensure_stream(&js, stream, subject).await?;
        Ok(Self {
            js,
            subject: subject.to_string(),
        })
    }

    async fn ensure_stream(js: &Context, stream: &str, subject: &str) -> AppResult<()> {
        match js.get_stream(stream).await {
            Ok(_) => {
                tracing::debug!(stream = %stream, "Using existing NATS stream");
                Ok(())
            }
            Err(_) => {
                // Work queue: a job is removed once a worker acks it
                let config = jetstream::stream::Config {
                    name: stream.to_string(),
                    subjects: vec![subject.to_string()],
                    retention: jetstream::stream::RetentionPolicy::WorkQueue,
                    storage: jetstream::stream::StorageType::File,
                    ..Default::default()
                };

                js.create_stream(config)
                    .await
                    .map_err(|e| AppError::Nats(e.to_string()))?;

                tracing::info!(stream = %stream, subject = %subject, "Created NATS stream");
                Ok(())
            }
        }
    }

    async fn publish(&self, job: &ScheduledJob) -> AppResult<()> {
        let payload = serde_json::to_vec(job)?;

        self.js
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| AppError::Nats(e.to_string()))?
            .await
            .map_err(|e| AppError::Nats(e.to_string()))?;

        tracing::debug!(job_id = %job.id, message = ?job.message, "Published job");
        Ok(())
    }
}

#[async_trait]
impl JobScheduler for NatsJobScheduler {
    async fn schedule_once(&self, message: JobMessage) -> AppResult<String> {
        let job = ScheduledJob::once(message);
        self.publish(&job).await?;
        Ok(job.id)
    }

    /// Published right away; workers re-deliver it with the cycle as delay.
    async fn schedule_recurring(&self, message: JobMessage, cycle: Duration) -> AppResult<String> {
        let job = ScheduledJob::recurring(message, cycle);
        self.publish(&job).await?;
        Ok(job.id)
    }

    /// Published envelopes cannot be withdrawn. A deleted batch turns its
    /// pending jobs into no-ops, which ends their re-delivery.
    async fn delete(&self, job_id: &str) -> AppResult<()> {
        tracing::debug!(job_id = %job_id, "Job will stop at its next delivery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let job = ScheduledJob::once(JobMessage::migrate_part("part-1"));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["message"]["type"], "migrate_part");
        assert_eq!(json["message"]["batchPartId"], "part-1");
        assert_eq!(json["retries"], 0);
        assert!(json.get("cycleMs").is_none());
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_SUBJECT, "migration.jobs");
        assert_eq!(DEFAULT_STREAM, "migration_jobs");
    }
}
