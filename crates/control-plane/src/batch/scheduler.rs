//! Job scheduling.
//!
//! The coordinator only hands [`JobMessage`]s to a [`JobScheduler`] and
//! keeps their ids. [`LocalJobQueue`] delivers them to an in-process
//! [`JobRunner`](crate::batch::JobRunner); the NATS scheduler in
//! [`crate::nats`] delivers them to worker processes.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::batch::job::{JobMessage, ScheduledJob};
use crate::error::{AppError, AppResult};

/// Schedules batch jobs.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Schedule a job to run once, returning its id.
    async fn schedule_once(&self, message: JobMessage) -> AppResult<String>;

    /// Schedule a job that re-arms itself every `cycle` while its executor
    /// asks for it.
    async fn schedule_recurring(&self, message: JobMessage, cycle: Duration) -> AppResult<String>;

    /// Stop a job from running again. A job already running is not interrupted.
    async fn delete(&self, job_id: &str) -> AppResult<()>;
}

/// In-process job queue backed by a tokio channel.
#[derive(Clone)]
pub struct LocalJobQueue {
    sender: mpsc::UnboundedSender<ScheduledJob>,
    cancelled: Arc<Mutex<HashSet<String>>>,
}

impl LocalJobQueue {
    /// Create a queue and the receiving end a runner consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScheduledJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            cancelled: Arc::new(Mutex::new(HashSet::new())),
        };
        (queue, receiver)
    }

    pub fn enqueue(&self, job: ScheduledJob) -> AppResult<()> {
        self.sender
            .send(job)
            .map_err(|_| AppError::Internal("Job queue is closed".to_string()))
    }

    /// Enqueue `job` once `delay` elapsed.
    pub fn enqueue_after(&self, job: ScheduledJob, delay: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.enqueue(job) {
                warn!(error = %e, "Dropping delayed job");
            }
        });
    }

    pub async fn is_cancelled(&self, job_id: &str) -> bool {
        self.cancelled.lock().await.contains(job_id)
    }
}

#[async_trait]
impl JobScheduler for LocalJobQueue {
    async fn schedule_once(&self, message: JobMessage) -> AppResult<String> {
        let job = ScheduledJob::once(message);
        let id = job.id.clone();
        self.enqueue(job)?;
        Ok(id)
    }

    async fn schedule_recurring(&self, message: JobMessage, cycle: Duration) -> AppResult<String> {
        let job = ScheduledJob::recurring(message, cycle);
        let id = job.id.clone();
        self.enqueue_after(job, cycle);
        Ok(id)
    }

    async fn delete(&self, job_id: &str) -> AppResult<()> {
        self.cancelled.lock().await.insert(job_id.to_string());
        debug!(job_id = %job_id, "Cancelled job");
        Ok(())
    }
}
