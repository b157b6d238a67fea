//! Worker configuration.

use anyhow::Result;
use std::time::Duration;

/// Migration worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier (UUID).
    pub worker_id: String,

    /// Control plane server URL.
    pub server_url: String,

    /// NATS server URL.
    pub nats_url: String,

    /// NATS stream name.
    pub nats_stream: String,

    /// Subject job envelopes are published to.
    pub nats_subject: String,

    /// Durable consumer name, shared by all workers of a deployment.
    pub nats_consumer: String,

    /// Maximum concurrent jobs.
    pub max_concurrent_jobs: usize,

    /// Consecutive transient failures of a job before it is dead-lettered.
    pub max_retries: u32,

    /// Delay before a failed job is re-queued.
    pub retry_delay: Duration,

    /// How long a job may run before JetStream redelivers it.
    pub ack_wait: Duration,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let worker_id = std::env::var("WORKER_ID").unwrap_or(defaults.worker_id);

        let server_url = std::env::var("MIGRATION_SERVER_URL").unwrap_or(defaults.server_url);

        let nats_url = std::env::var("NATS_URL").unwrap_or(defaults.nats_url);

        let nats_stream = std::env::var("NATS_STREAM").unwrap_or(defaults.nats_stream);

        let nats_subject = std::env::var("NATS_SUBJECT").unwrap_or(defaults.nats_subject);

        let nats_consumer = std::env::var("NATS_CONSUMER").unwrap_or(defaults.nats_consumer);

        Ok(Self {
            worker_id,
            server_url,
            nats_url,
            nats_stream,
            nats_subject,
            nats_consumer,
            max_concurrent_jobs: env_or("WORKER_MAX_CONCURRENT", defaults.max_concurrent_jobs).max(1),
            max_retries: env_or("WORKER_MAX_RETRIES", defaults.max_retries),
            retry_delay: Duration::from_millis(env_or("WORKER_RETRY_DELAY_MS", 500)),
            ack_wait: Duration::from_secs(env_or("WORKER_ACK_WAIT_SECS", 300)),
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            server_url: "http://localhost:8083".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            nats_stream: "migration_jobs".to_string(),
            nats_subject: "migration.jobs".to_string(),
            nats_consumer: "migration-worker".to_string(),
            max_concurrent_jobs: 4,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            ack_wait: Duration::from_secs(300),
        }
    }
}
