//! In-process job runner.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::batch::job::{JobMessage, JobOutcome, ScheduledJob};
use crate::batch::scheduler::LocalJobQueue;
use crate::error::AppResult;
use crate::result_ext::ResultExt;

/// Executes job messages.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, message: &JobMessage) -> JobOutcome;

    /// Give up on a job whose retries are exhausted.
    async fn dead_letter(&self, message: &JobMessage, reason: &str) -> AppResult<()>;
}

/// Runs queued jobs on tokio tasks, at most `concurrency` at a time.
pub struct JobRunner {
    queue: LocalJobQueue,
    handler: Arc<dyn JobHandler>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    max_retries: u32,
}

impl JobRunner {
    pub fn new(
        queue: LocalJobQueue,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        max_retries: u32,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            queue,
            handler,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            max_retries,
        }
    }

    pub fn spawn(self, receiver: mpsc::UnboundedReceiver<ScheduledJob>) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    /// Run until the queue closes, then wait for in-flight jobs.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<ScheduledJob>) {
        while let Some(job) = receiver.recv().await {
            if self.queue.is_cancelled(&job.id).await {
                debug!(job_id = %job.id, "Skipping cancelled job");
                continue;
            }
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };

            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let max_retries = self.max_retries;
            tokio::spawn(async move {
                let _permit = permit;
                process(&queue, handler.as_ref(), job, max_retries).await;
            });
        }

        let _ = self.semaphore.acquire_many(self.concurrency as u32).await;
        debug!("Job runner drained");
    }
}

async fn process(queue: &LocalJobQueue, handler: &dyn JobHandler, mut job: ScheduledJob, max_retries: u32) {
    debug!(job_id = %job.id, message = ?job.message, retries = job.retries, "Executing job");

    let outcome = handler.execute(&job.message).await;
    match outcome {
        JobOutcome::Done => {
            debug!(job_id = %job.id, "Job done");
        }
        JobOutcome::Reschedule { delay_ms } => {
            // Retries count consecutive failures only
            job.retries = 0;
            queue.enqueue_after(job, Duration::from_millis(delay_ms));
        }
        JobOutcome::Retry { reason } if job.retries < max_retries => {
            job.retries += 1;
            warn!(job_id = %job.id, retries = job.retries, reason = %reason, "Retrying job");
            if let Err(e) = queue.enqueue(job) {
                error!(error = %e, "Failed to requeue job");
            }
        }
        JobOutcome::Retry { reason } => {
            warn!(job_id = %job.id, reason = %reason, "Job retries exhausted");
            let _ = handler
                .dead_letter(&job.message, &reason)
                .await
                .log(format!("dead-lettering job {}", job.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::scheduler::JobScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Fails every job with a retryable error and records dead letters.
    #[derive(Default)]
    struct AlwaysConflicting {
        attempts: AtomicUsize,
        dead: Mutex<Vec<JobMessage>>,
    }

    #[async_trait]
    impl JobHandler for AlwaysConflicting {
        async fn execute(&self, _message: &JobMessage) -> JobOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            JobOutcome::Retry {
                reason: "revision changed".to_string(),
            }
        }

        async fn dead_letter(&self, message: &JobMessage, _reason: &str) -> AppResult<()> {
            self.dead.lock().await.push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_retries_then_dead_letters() {
        let (queue, receiver) = LocalJobQueue::new();
        let handler = Arc::new(AlwaysConflicting::default());
        JobRunner::new(queue.clone(), handler.clone(), 2, 3).spawn(receiver);

        queue
            .schedule_once(JobMessage::migrate_part("part-1"))
            .await
            .unwrap();

        for _ in 0..200 {
            if !handler.dead.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(handler.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(*handler.dead.lock().await, vec![JobMessage::migrate_part("part-1")]);
    }

    /// Answers each run of a job with the next scripted outcome.
    struct Scripted {
        outcomes: Mutex<Vec<JobOutcome>>,
        attempts: AtomicUsize,
        dead: Mutex<Vec<JobMessage>>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<JobOutcome>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                attempts: AtomicUsize::new(0),
                dead: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl JobHandler for Scripted {
        async fn execute(&self, _message: &JobMessage) -> JobOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().await.pop().unwrap_or(JobOutcome::Done)
        }

        async fn dead_letter(&self, message: &JobMessage, _reason: &str) -> AppResult<()> {
            self.dead.lock().await.push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reschedule_resets_retry_count() {
        let (queue, receiver) = LocalJobQueue::new();
        let transient = || JobOutcome::Retry {
            reason: "connection reset".to_string(),
        };
        let poll = || JobOutcome::Reschedule { delay_ms: 1 };
        let handler = Arc::new(Scripted::new(vec![
            transient(),
            poll(),
            transient(),
            poll(),
            transient(),
            poll(),
            JobOutcome::Done,
        ]));
        JobRunner::new(queue.clone(), handler.clone(), 1, 1).spawn(receiver);

        queue
            .enqueue(ScheduledJob::recurring(
                JobMessage::batch_status("b-1"),
                Duration::from_millis(1),
            ))
            .unwrap();

        for _ in 0..200 {
            if handler.attempts.load(Ordering::SeqCst) >= 7 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(handler.attempts.load(Ordering::SeqCst), 7);
        assert!(handler.dead.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_job_is_skipped() {
        let (queue, receiver) = LocalJobQueue::new();
        let handler = Arc::new(AlwaysConflicting::default());
        JobRunner::new(queue.clone(), handler.clone(), 1, 0).spawn(receiver);

        let job = ScheduledJob::once(JobMessage::migrate_part("part-1"));
        queue.delete(&job.id).await.unwrap();
        queue.enqueue(job).unwrap();
        queue
            .schedule_once(JobMessage::migrate_part("part-2"))
            .await
            .unwrap();

        for _ in 0..200 {
            if !handler.dead.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(*handler.dead.lock().await, vec![JobMessage::migrate_part("part-2")]);
    }
}
