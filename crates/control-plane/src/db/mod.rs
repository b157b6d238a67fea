//! Database module for the migration control plane.
//!
//! PostgreSQL connectivity, row models, queries, schema management and the
//! [`PgStore`] implementation of the collaborator ports, using SQLx.

pub mod models;
pub mod pool;
pub mod queries;
pub mod schema;
pub mod store;

pub use pool::{create_pool, DbPool};
pub use store::PgStore;
