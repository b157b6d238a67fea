//! NATS JetStream job consumption.

pub mod subscriber;

pub use subscriber::{JobEnvelope, JobPublisher, NatsSubscriber};
