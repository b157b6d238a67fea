//! Application state for the migration control plane server.
//!
//! Shared resources handed to every handler via Axum's state management.

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::services::MigrationService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Migration engine facade
    pub service: MigrationService,

    /// Database connection pool; absent when running on the in-memory store
    pub db: Option<DbPool>,

    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Whether jobs are published to NATS JetStream
    pub nats: bool,

    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: MigrationService, db: Option<DbPool>, config: AppConfig, nats: bool) -> Self {
        Self {
            service,
            db,
            config: Arc::new(config),
            nats,
            start_time: std::time::Instant::now(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if jobs go through NATS rather than the in-process queue.
    pub fn has_nats(&self) -> bool {
        self.nats
    }
}
