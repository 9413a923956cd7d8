//! mc2-lifecycle — the controller state machine in motion.
//!
//! # Components
//!
//! - **`lifecycle`** — `ControllerLifecycle`: create, creation job body,
//!   edit, restart, delete, reconcile, retry, task lookup
//! - **`jobs`** — `JobQueue` seam, tokio channel queue, worker loop
//! - **`poller`** — periodic reconciliation and re-enqueue of `pending`
//! - **`hooks`** — ordered post-transition hooks (log, broadcast)

pub mod error;
pub mod hooks;
pub mod jobs;
pub mod lifecycle;
pub mod poller;

#[cfg(test)]
mod testing;

pub use error::{LifecycleError, LifecycleResult};
pub use hooks::{broadcast_hook, log_hook, TransitionEvent, TransitionHook};
pub use jobs::{ChannelQueue, Job, JobQueue, JobWorker};
pub use lifecycle::{ActionOutcome, ControllerLifecycle};
pub use poller::{PollStats, ReconciliationPoller};
