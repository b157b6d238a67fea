//! NATS JetStream integration.
//!
//! Delivers batch jobs to process-independent migration workers.

pub mod publisher;

pub use publisher::NatsJobScheduler;
