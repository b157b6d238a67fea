//! Worker lifecycle management.

use anyhow::Result;
use async_nats::jetstream::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::client::{ControlPlaneClient, JobOutcome};
use crate::config::WorkerConfig;
use crate::nats::{subscriber, JobEnvelope, JobPublisher, NatsSubscriber};

/// What to do with a delivered message once its job ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Job finished; remove it from the stream.
    Ack,
    /// Redeliver the same envelope after the delay.
    Nak(Duration),
    /// Publish the envelope again with a new failure count after the delay,
    /// then ack the delivered message.
    Requeue { retries: u32, delay: Duration },
    /// Retries exhausted; report to the control plane, then ack.
    DeadLetter(String),
}

/// Map a job outcome to a message disposition.
///
/// `retries` is the number of consecutive failed runs carried by the
/// envelope. A job may fail `max_retries + 1` times in a row before it is
/// dead-lettered; a successful run of a recurring job resets the count, so
/// redeliveries of a long-lived status job never add up to a dead letter.
pub fn dispose(outcome: JobOutcome, retries: u32, max_retries: u32, retry_delay: Duration) -> Disposition {
    match outcome {
        JobOutcome::Done => Disposition::Ack,
        JobOutcome::Reschedule { delay_ms } => {
            let delay = Duration::from_millis(delay_ms);
            if retries == 0 {
                Disposition::Nak(delay)
            } else {
                Disposition::Requeue { retries: 0, delay }
            }
        }
        JobOutcome::Retry { reason } => {
            if retries < max_retries {
                Disposition::Requeue {
                    retries: retries + 1,
                    delay: retry_delay,
                }
            } else {
                Disposition::DeadLetter(reason)
            }
        }
    }
}

/// Worker that executes migration jobs.
pub struct Worker {
    /// Worker configuration.
    config: WorkerConfig,

    /// NATS subscriber for job envelopes.
    subscriber: NatsSubscriber,

    /// Publisher for re-queued envelopes.
    publisher: JobPublisher,

    /// Control plane HTTP client.
    client: ControlPlaneClient,

    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
}

impl Worker {
    /// Create a new worker.
    pub async fn new(config: WorkerConfig) -> Result<Self> {
        let subscriber = NatsSubscriber::connect(
            &config.nats_url,
            &config.nats_stream,
            &config.nats_subject,
            &config.nats_consumer,
            config.ack_wait,
        )
        .await?;

        let publisher = subscriber.publisher();

        // One job never outlives its ack window
        let client = ControlPlaneClient::new(&config.server_url, config.ack_wait);

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        Ok(Self {
            config,
            subscriber,
            publisher,
            client,
            semaphore,
        })
    }

    /// Process jobs until an unrecoverable NATS error.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            worker_id = %self.config.worker_id,
            max_concurrent = self.config.max_concurrent_jobs,
            "Worker started"
        );

        loop {
            // Wait for available slot
            let permit = self.semaphore.clone().acquire_owned().await?;

            match self.subscriber.receive().await? {
                Some((envelope, msg)) => {
                    tracing::debug!(
                        job_id = %envelope.id,
                        message = %envelope.message,
                        "Received job"
                    );

                    let client = self.client.clone();
                    let publisher = self.publisher.clone();
                    let max_retries = self.config.max_retries;
                    let retry_delay = self.config.retry_delay;

                    tokio::spawn(async move {
                        // Keep permit until done
                        let _permit = permit;
                        if let Err(e) = handle(&client, &publisher, envelope, msg, max_retries, retry_delay).await {
                            tracing::error!(error = %e, "Job handling failed");
                        }
                    });
                }
                None => {
                    drop(permit);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn handle(
    client: &ControlPlaneClient,
    publisher: &JobPublisher,
    envelope: JobEnvelope,
    msg: Message,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<()> {
    let outcome = match client.execute_job(&envelope.message).await {
        Ok(outcome) => outcome,
        Err(e) => JobOutcome::Retry {
            reason: e.to_string(),
        },
    };

    match dispose(outcome, envelope.retries, max_retries, retry_delay) {
        Disposition::Ack => {
            tracing::debug!(job_id = %envelope.id, "Job done");
            subscriber::ack(&msg).await
        }
        Disposition::Nak(delay) => {
            tracing::debug!(
                job_id = %envelope.id,
                delay_ms = delay.as_millis() as u64,
                "Job redelivery requested"
            );
            subscriber::nak(&msg, delay).await
        }
        Disposition::Requeue { retries, delay } => {
            tracing::debug!(
                job_id = %envelope.id,
                retries,
                delay_ms = delay.as_millis() as u64,
                "Re-queuing job"
            );
            // Ack only once the successor is stored
            tokio::time::sleep(delay).await;
            publisher.publish(&envelope.with_retries(retries)).await?;
            subscriber::ack(&msg).await
        }
        Disposition::DeadLetter(reason) => {
            tracing::warn!(
                job_id = %envelope.id,
                retries = envelope.retries,
                reason = %reason,
                "Job retries exhausted, dead-lettering"
            );
            client
                .dead_letter_with_retry(&envelope.message, &reason, max_retries)
                .await?;
            subscriber::ack(&msg).await
        }
    }
}
