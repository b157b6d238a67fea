//! Batch migration across all instances of a definition.
//!
//! - [`types`]: batch and batch part records
//! - [`job`]: job messages and outcomes
//! - [`scheduler`]: the scheduling seam and the in-process queue
//! - [`runner`]: the in-process job runner
//! - [`coordinator`]: batch creation and job execution

pub mod coordinator;
pub mod job;
pub mod runner;
pub mod scheduler;
pub mod types;

pub use coordinator::BatchMigrationCoordinator;
pub use job::{JobMessage, JobOutcome, ScheduledJob};
pub use runner::{JobHandler, JobRunner};
pub use scheduler::{JobScheduler, LocalJobQueue};
pub use types::{
    derive_batch_status, Batch, BatchMigrationResult, BatchPart, BatchPartResult, BatchPartStatus,
    BatchStatus, MIGRATION_BATCH_TYPE,
};
