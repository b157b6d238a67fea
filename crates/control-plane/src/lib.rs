//! Migration Control Plane Library
//!
//! Moves running process instances from one process definition version to
//! another while they are live:
//!
//! - **Validation**: classify a migration document against the running
//!   executions of an instance and report structural problems
//! - **Migration**: resolve, plan and apply the execution-tree transform,
//!   with pre/post hooks, in one atomic commit
//! - **Batch migration**: one isolated job per instance, aggregated into a
//!   batch whose status is polled by a recurring job
//!
//! ## Architecture
//!
//! The engine works on in-memory snapshots loaded through the collaborator
//! ports in [`ports`] and hands the resulting writes back in one commit
//! guarded by an optimistic revision check. PostgreSQL backs the ports in
//! production ([`db::PgStore`]); [`memory::MemoryStore`] backs tests and
//! single-node development. Batch jobs run on the in-process queue or are
//! published to NATS JetStream for the migration workers.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`model`]: Process model graphs
//! - [`runtime`]: Execution trees of live instances
//! - [`migration`]: Document, validator, resolver, planner and executor
//! - [`batch`]: Batch coordinator, jobs and the in-process runner
//! - [`db`]: Database connectivity and the PostgreSQL store
//! - [`nats`]: JetStream job scheduler
//! - [`error`]: Custom error types with Axum integration
//! - [`handlers`]: HTTP route handlers
//! - [`state`]: Shared application state
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use migration_control_plane::{
//!     batch::LocalJobQueue,
//!     memory::MemoryStore,
//!     migration::{ActivityMigrationMapping, DelegateRegistry, MigrationDocument},
//!     services::{MigrationService, MigrationSettings},
//! };
//!
//! let (queue, _jobs) = LocalJobQueue::new();
//! let service = MigrationService::with_store(
//!     MemoryStore::new(),
//!     Arc::new(queue),
//!     DelegateRegistry::default(),
//!     MigrationSettings::default(),
//! );
//! let doc = MigrationDocument::builder()
//!     .migrate_to_definition("orderProcess", 2)
//!     .add_mapping(ActivityMigrationMapping::one_to_one("taskA", "taskB"))
//!     .build()?;
//! service.migrate_instance("pi-1", &doc).await?;
//! ```

pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod expression;
pub mod handlers;
pub mod memory;
pub mod migration;
pub mod model;
pub mod nats;
pub mod ports;
pub mod result_ext;
pub mod runtime;
pub mod services;
pub mod state;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
