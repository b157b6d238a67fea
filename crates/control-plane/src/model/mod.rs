//! Process model graphs.
//!
//! A process model is the read-only activity graph of one process
//! definition version:
//! - every activity has a kind and an optional parent container
//! - multi-instance characteristics on any activity
//! - called elements on call activities
//! - boundary events attached to the activity they guard

pub mod parser;
pub mod types;

pub use parser::{parse_model, validate_model};
pub use types::{ActivityKind, ActivityNode, MultiInstance, ProcessModel};
