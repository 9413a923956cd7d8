//! Periodic reconciliation of desired vs. observed state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use mc2_state::ControllerState;

use crate::error::LifecycleResult;
use crate::lifecycle::ControllerLifecycle;

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub checked: usize,
    pub changed: usize,
    pub requeued: usize,
    pub errors: usize,
}

pub struct ReconciliationPoller {
    lifecycle: Arc<ControllerLifecycle>,
    interval: Duration,
}

impl ReconciliationPoller {
    pub fn new(lifecycle: Arc<ControllerLifecycle>, interval: Duration) -> Self {
        Self {
            lifecycle,
            interval,
        }
    }

    /// One pass: reconcile `done`/`missing`, re-enqueue `pending` ones
    /// that have no creation job queued or running.
    ///
    /// A scheduler error on one controller doesn't stop the pass.
    pub async fn reconcile_all(&self) -> LifecycleResult<PollStats> {
        let mut stats = PollStats::default();
        let store = self.lifecycle.store();

        for controller in store.list_controllers_in(&[ControllerState::Done, ControllerState::Missing])? {
            stats.checked += 1;
            match self.lifecycle.reconcile(&controller.id).await {
                Ok(state) if state != controller.state() => stats.changed += 1,
                Ok(_) => {}
                Err(e) => {
                    stats.errors += 1;
                    warn!(controller = %controller.id, app_id = %controller.app_id, error = %e, "reconcile failed");
                }
            }
        }

        for controller in store.list_controllers_in(&[ControllerState::Pending])? {
            if self.lifecycle.enqueue_start(&controller.id).await {
                stats.requeued += 1;
            }
        }

        debug!(
            checked = stats.checked,
            changed = stats.changed,
            requeued = stats.requeued,
            errors = stats.errors,
            "reconciliation pass complete"
        );
        Ok(stats)
    }

    /// Run passes every `interval` until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "reconciliation poller started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.reconcile_all().await {
                        error!(error = %e, "reconciliation pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciliation poller shutting down");
                    break;
                }
            }
        }
    }
}
