//! In-process job queue and worker.
//!
//! Creation work runs here rather than inside the HTTP request. Delivery
//! is at-least-once: the poller re-enqueues controllers still `pending`,
//! so a job may run more than once and its body has to be idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use mc2_state::ControllerId;

use crate::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::ControllerLifecycle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    StartController { id: ControllerId },
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> LifecycleResult<()>;
}

/// Unbounded tokio channel queue.
#[derive(Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn enqueue(&self, job: Job) -> LifecycleResult<()> {
        debug!(?job, "enqueue job");
        self.tx.send(job).map_err(|_| LifecycleError::QueueClosed)
    }
}

/// Drains a [`ChannelQueue`] and runs each job against the lifecycle.
pub struct JobWorker {
    lifecycle: Arc<ControllerLifecycle>,
    rx: mpsc::UnboundedReceiver<Job>,
}

impl JobWorker {
    pub fn new(lifecycle: Arc<ControllerLifecycle>, rx: mpsc::UnboundedReceiver<Job>) -> Self {
        Self { lifecycle, rx }
    }

    /// Run until shutdown is signalled or every sender is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("job worker started");
        loop {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => self.handle(job).await,
                    None => {
                        info!("job queue closed, worker exiting");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("job worker shutting down");
                    break;
                }
            }
        }
    }

    async fn handle(&self, job: Job) {
        match job {
            Job::StartController { id } => match self.lifecycle.run_create(&id).await {
                Ok(state) => debug!(controller = %id, %state, "creation job finished"),
                Err(e) => warn!(controller = %id, error = %e, "creation job failed"),
            },
        }
    }
}
