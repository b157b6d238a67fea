//! Database models for the migration control plane.
//!
//! SQLx row types of the `migration` schema and their conversions into
//! engine types.

pub mod batch;
pub mod definition;
pub mod instance;

pub use batch::*;
pub use definition::*;
pub use instance::*;
