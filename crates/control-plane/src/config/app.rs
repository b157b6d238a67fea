//! Application configuration for the migration control plane.

use std::time::Duration;

use serde::Deserialize;

use crate::migration::HistoryLevel;

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `MIGRATION_`:
/// - `MIGRATION_HOST`: Server bind address (default: "0.0.0.0")
/// - `MIGRATION_PORT`: Server port (default: 8083)
/// - `MIGRATION_NATS_URL`: NATS URL; without it jobs run on the in-process queue
/// - `MIGRATION_HISTORY_LEVEL`: `none`, `activity`, `audit` or `full` (default: audit)
/// - `MIGRATION_BATCH_STATUS_CYCLE_SECS`: status job polling cycle (default: 10)
/// - `MIGRATION_JOB_MAX_RETRIES`: retries for conflicting part jobs (default: 3)
/// - `MIGRATION_LOCAL_WORKERS`: concurrency of the in-process job runner (default: 4)
/// - `MIGRATION_INIT_SCHEMA`: create the `migration` schema on startup
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// NATS URL (optional)
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Subject migration jobs are published to
    #[serde(default = "default_nats_subject")]
    pub nats_subject: String,

    /// JetStream stream holding migration jobs
    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    /// History detail level; definition refs are rewritten at `activity` and above
    #[serde(default)]
    pub history_level: HistoryLevel,

    /// Recurring cycle of the batch status job, in seconds
    #[serde(default = "default_status_cycle")]
    pub batch_status_cycle_secs: u64,

    /// Maximum retries of a part job failing with a concurrency conflict
    #[serde(default = "default_max_retries")]
    pub job_max_retries: u32,

    /// Concurrent jobs of the in-process runner
    #[serde(default = "default_local_workers")]
    pub local_workers: usize,

    /// Create the database schema on startup
    #[serde(default)]
    pub init_schema: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8083
}

fn default_server_name() -> String {
    "migration-control-plane".to_string()
}

fn default_nats_subject() -> String {
    "migration.jobs".to_string()
}

fn default_nats_stream() -> String {
    "migration_jobs".to_string()
}

fn default_status_cycle() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_local_workers() -> usize {
    4
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `MIGRATION_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("MIGRATION_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Polling cycle of the recurring batch status job.
    pub fn batch_status_cycle(&self) -> Duration {
        Duration::from_secs(self.batch_status_cycle_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
            nats_url: None,
            nats_subject: default_nats_subject(),
            nats_stream: default_nats_stream(),
            history_level: HistoryLevel::default(),
            batch_status_cycle_secs: default_status_cycle(),
            job_max_retries: default_max_retries(),
            local_workers: default_local_workers(),
            init_schema: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8083);
        assert_eq!(config.history_level, HistoryLevel::Audit);
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8083");
    }

    #[test]
    fn test_status_cycle_never_zero() {
        let config = AppConfig {
            batch_status_cycle_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.batch_status_cycle(), Duration::from_secs(1));
    }
}
