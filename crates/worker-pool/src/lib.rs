//! Migration Worker
//!
//! Executes batch migration jobs delivered via NATS JetStream.
//!
//! This crate provides:
//! - NATS JetStream subscriber for job envelopes
//! - Control plane HTTP client executing jobs and dead-lettering them
//! - Ack/nak decisions from job outcomes

pub mod client;
pub mod config;
pub mod nats;
pub mod worker;

pub use config::WorkerConfig;
pub use worker::Worker;
