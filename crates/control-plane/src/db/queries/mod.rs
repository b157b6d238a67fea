//! Database queries for the migration control plane, organized by table group.

pub mod batch;
pub mod definition;
pub mod history;
pub mod instance;
