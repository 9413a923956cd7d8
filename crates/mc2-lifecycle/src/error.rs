//! Lifecycle error types.

use thiserror::Error;

use mc2_configs::ConfigError;
use mc2_marathon::SchedulerError;
use mc2_state::{InvalidTransition, StateError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("controller not found: {0}")]
    NotFound(String),

    #[error("controller {0} is deleted")]
    Deleted(String),

    /// The scheduler accepted the app but its configs were not written.
    #[error("app {app_id} was submitted but its config could not be written: {source}")]
    PartialFailure { app_id: String, source: ConfigError },

    #[error("job queue is closed")]
    QueueClosed,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
