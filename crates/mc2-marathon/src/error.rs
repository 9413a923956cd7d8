//! Scheduler error types.

use thiserror::Error;

/// Errors talking to the scheduler. None of these are retried here.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler request timed out: {0}")]
    Timeout(String),

    #[error("scheduler transport error: {0}")]
    Transport(String),

    #[error("scheduler returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed scheduler response: {0}")]
    Malformed(String),

    #[error("invalid scheduler client configuration: {0}")]
    Config(String),
}

impl SchedulerError {
    /// A timed-out call may still have been applied remotely.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SchedulerError::Timeout(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SchedulerError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SchedulerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SchedulerError::Timeout(e.to_string())
        } else if e.is_decode() {
            SchedulerError::Malformed(e.to_string())
        } else {
            SchedulerError::Transport(e.to_string())
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
