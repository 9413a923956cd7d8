//! Response envelope and error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use mc2_configs::ConfigError;
use mc2_lifecycle::LifecycleError;
use mc2_state::StateError;

/// `{success, data?, warning?, error?}` wrapper for every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Self::with_warning(data, None)
    }

    pub fn with_warning(data: T, warning: Option<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            warning,
            error: None,
        })
    }
}

/// Error leaving a handler: a status plus a user-facing message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{what} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()> {
                success: false,
                data: None,
                warning: None,
                error: Some(self.message),
            }),
        )
            .into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        let status = match &e {
            LifecycleError::InvalidTransition(_) | LifecycleError::Deleted(_) => StatusCode::CONFLICT,
            LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::Scheduler(_) | LifecycleError::PartialFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            LifecycleError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            LifecycleError::Config(ConfigError::InvalidTarget(_)) => StatusCode::BAD_REQUEST,
            LifecycleError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LifecycleError::State(StateError::NotFound(_)) => StatusCode::NOT_FOUND,
            LifecycleError::State(StateError::Conflict(_) | StateError::Immutable(_)) => {
                StatusCode::CONFLICT
            }
            LifecycleError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        Self::new(status, e.to_string())
    }
}

impl From<StateError> for ApiError {
    fn from(e: StateError) -> Self {
        LifecycleError::State(e).into()
    }
}
