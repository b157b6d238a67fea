//! Service layer for the migration control plane.
//!
//! Services encapsulate the engine wiring and coordinate between handlers
//! and the collaborator ports.

pub mod migration;

pub use migration::{MigrationService, MigrationSettings};
