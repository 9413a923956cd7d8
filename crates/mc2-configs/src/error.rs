//! Config artifact error types.

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("template render failed: {0}")]
    Render(String),

    #[error("workspace io error: {0}")]
    Io(String),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("workspace command timed out after {0}s")]
    Timeout(u64),

    #[error("path escapes the workspace: {0}")]
    PathEscape(String),

    #[error("invalid deployment target: {0}")]
    InvalidTarget(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}
