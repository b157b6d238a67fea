//! NATS JetStream subscriber for migration jobs.

use anyhow::Result;
use async_nats::jetstream::{
    self,
    consumer::{pull::Config as ConsumerConfig, Consumer},
    AckKind, Context, Message,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job envelope published by the control plane.
///
/// The message is forwarded to the control plane untouched, so the worker
/// does not need to know every job type. `retries` counts consecutive
/// failed runs of the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub id: String,
    pub message: serde_json::Value,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_ms: Option<u64>,
}

impl JobEnvelope {
    /// Copy of this envelope carrying `retries` consecutive failures.
    pub fn with_retries(&self, retries: u32) -> Self {
        Self {
            retries,
            ..self.clone()
        }
    }
}

/// NATS JetStream subscriber for job envelopes.
pub struct NatsSubscriber {
    /// Durable pull consumer.
    consumer: Consumer<ConsumerConfig>,

    /// Publisher on the same subject, for re-queued envelopes.
    publisher: JobPublisher,
}

/// Publishes job envelopes back onto the job subject.
#[derive(Clone)]
pub struct JobPublisher {
    js: Context,
    subject: String,
}

impl JobPublisher {
    /// Publish `envelope` and wait for the stream to store it.
    pub async fn publish(&self, envelope: &JobEnvelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        self.js
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to publish job: {}", e))?
            .await
            .map_err(|e| anyhow::anyhow!("Job publish not acknowledged: {}", e))?;
        tracing::debug!(job_id = %envelope.id, retries = envelope.retries, "Re-published job");
        Ok(())
    }
}

impl NatsSubscriber {
    /// Connect to NATS and bind the durable consumer, creating the stream
    /// and consumer when missing.
    pub async fn connect(
        nats_url: &str,
        stream: &str,
        subject: &str,
        consumer: &str,
        ack_wait: Duration,
    ) -> Result<Self> {
        let client = async_nats::connect(nats_url).await?;
        let js = jetstream::new(client);
        Self::ensure_stream(&js, stream, subject).await?;

        let stream = js.get_stream(stream).await?;
        let consumer = match stream.get_consumer(consumer).await {
            Ok(existing) => existing,
            Err(_) => {
                let config = ConsumerConfig {
                    durable_name: Some(consumer.to_string()),
                    filter_subject: subject.to_string(),
                    ack_wait,
                    ..Default::default()
                };
                let created = stream.create_consumer(config).await?;
                tracing::info!(consumer = %consumer, "Created NATS consumer");
                created
            }
        };

        let publisher = JobPublisher {
            js,
            subject: subject.to_string(),
        };
        Ok(Self { consumer, publisher })
    }

    /// Publisher for re-queuing envelopes on the consumed subject.
    pub fn publisher(&self) -> JobPublisher {
        self.publisher.clone()
    }

    async fn ensure_stream(js: &Context, stream: &str, subject: &str) -> Result<()> {
        match js.get_stream(stream).await {
            Ok(_) => {
                tracing::debug!(stream = %stream, "Using existing NATS stream");
            }
            Err(_) => {
                let config = jetstream::stream::Config {
                    name: stream.to_string(),
                    subjects: vec![subject.to_string()],
                    retention: jetstream::stream::RetentionPolicy::WorkQueue,
                    ..Default::default()
                };
                js.create_stream(config).await?;
                tracing::info!(stream = %stream, "Created NATS stream");
            }
        }
        Ok(())
    }

    /// Receive the next job envelope.
    ///
    /// Returns `None` when no message arrived before the fetch expired.
    /// Undecodable payloads are terminated so they are never redelivered.
    pub async fn receive(&self) -> Result<Option<(JobEnvelope, Message)>> {
        let mut messages = self.consumer.fetch().max_messages(1).messages().await?;

        if let Some(msg) = messages.next().await {
            let msg = msg.map_err(|e| anyhow::anyhow!("Failed to receive message: {}", e))?;
            match serde_json::from_slice::<JobEnvelope>(&msg.payload) {
                Ok(envelope) => return Ok(Some((envelope, msg))),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable job envelope");
                    msg.ack_with(AckKind::Term)
                        .await
                        .map_err(|e| anyhow::anyhow!("Failed to terminate message: {}", e))?;
                }
            }
        }

        Ok(None)
    }
}

/// Acknowledge a message.
pub async fn ack(msg: &Message) -> Result<()> {
    msg.ack()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to ack message: {}", e))?;
    Ok(())
}

/// Negatively acknowledge a message; it is redelivered after `delay`.
pub async fn nak(msg: &Message, delay: Duration) -> Result<()> {
    msg.ack_with(AckKind::Nak(Some(delay)))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to nak message: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_from_control_plane_payload() {
        let json = r#"{"id":"j-1","message":{"type":"batch_status","batchId":"b-1"},"retries":0,"cycleMs":10000}"#;
        let envelope: JobEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.id, "j-1");
        assert_eq!(envelope.cycle_ms, Some(10000));
        assert_eq!(envelope.message["batchId"], "b-1");
    }

    #[test]
    fn test_envelope_retries_default_to_zero() {
        let json = r#"{"id":"j-2","message":{"type":"migrate_part","batchPartId":"p-1"}}"#;
        let envelope: JobEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.retries, 0);
        assert!(envelope.cycle_ms.is_none());
    }

    #[test]
    fn test_with_retries_keeps_job_identity() {
        let json = r#"{"id":"j-3","message":{"type":"batch_status","batchId":"b-1"},"retries":2,"cycleMs":10000}"#;
        let envelope: JobEnvelope = serde_json::from_str(json).unwrap();

        let reset = envelope.with_retries(0);
        assert_eq!(reset.id, "j-3");
        assert_eq!(reset.retries, 0);
        assert_eq!(reset.cycle_ms, Some(10000));
        assert_eq!(reset.message, envelope.message);
    }
}
