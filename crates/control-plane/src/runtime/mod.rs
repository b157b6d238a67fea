//! Live runtime state of process instances.

pub mod tree;

pub use tree::{ExecutionNode, InstanceState, RuntimeSnapshot};
