//! mc2-api — REST API for mc2.
//!
//! Axum handlers for managing controllers. Identity comes from headers
//! set by the authenticating proxy (see [`auth`]).
//!
//! # API Routes
//!
//! | Method | Path | Permission | Description |
//! |---|---|---|---|
//! | GET | `/api/v1/controllers` | view | List visible controllers |
//! | POST | `/api/v1/controllers` | add | Create a controller |
//! | GET | `/api/v1/controllers/{id}` | view | Controller summary |
//! | PUT | `/api/v1/controllers/{id}` | change | Edit the spec |
//! | DELETE | `/api/v1/controllers/{id}` | delete | Tear down and soft delete |
//! | POST | `/api/v1/controllers/{id}/restart` | change | Restart on the scheduler |
//! | POST | `/api/v1/controllers/{id}/retry` | change | Retry a failed creation |
//! | GET | `/api/v1/controllers/{id}/status` | view | Reconcile and report state |
//! | GET | `/api/v1/controllers/{id}/tasks` | view | Scheduler tasks |
//! | GET | `/api/v1/controllers/{id}/logs/{task_id}/{stream}` | view | Log redirect |
//! | GET | `/healthz` | — | Liveness |

pub mod auth;
pub mod handlers;
pub mod logs;
pub mod response;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use mc2_core::LogDriverConfig;
use mc2_lifecycle::ControllerLifecycle;

pub use auth::{Permission, Principal};
pub use response::{ApiError, ApiResponse};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: Arc<ControllerLifecycle>,
    pub logdriver: LogDriverConfig,
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/controllers",
            get(handlers::list_controllers).post(handlers::create_controller),
        )
        .route(
            "/controllers/{id}",
            get(handlers::get_controller)
                .put(handlers::update_controller)
                .delete(handlers::delete_controller),
        )
        .route("/controllers/{id}/restart", post(handlers::restart_controller))
        .route("/controllers/{id}/retry", post(handlers::retry_controller))
        .route("/controllers/{id}/status", get(handlers::controller_status))
        .route("/controllers/{id}/tasks", get(handlers::list_tasks))
        .route(
            "/controllers/{id}/logs/{task_id}/{stream}",
            get(logs::task_logs),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
