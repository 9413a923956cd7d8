//! Task log redirect.
//!
//! mc2 never streams log bytes itself. It resolves the task sandbox and
//! answers with an `X-Accel-Redirect` the reverse proxy follows to the
//! log driver, with buffering off so the stream stays live.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::auth::{Permission, Principal};
use crate::handlers::load_visible;
use crate::response::ApiError;
use crate::ApiState;

pub const ACCEL_REDIRECT: &str = "x-accel-redirect";
pub const ACCEL_BUFFERING: &str = "x-accel-buffering";

const STREAMS: [&str; 2] = ["stdout", "stderr"];

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub n: Option<u32>,
}

/// `<logdriver>/<host>/<working_dir>/<stream>?n=<n>`
pub fn redirect_target(logdriver: &str, host: &str, working_dir: &str, stream: &str, n: u32) -> String {
    let parts = [logdriver, host, working_dir, stream]
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{parts}?n={n}")
}

/// GET /api/v1/controllers/{id}/logs/{task_id}/{stream}
pub async fn task_logs(
    State(state): State<ApiState>,
    principal: Principal,
    Path((id, task_id, stream)): Path<(String, String, String)>,
    Query(query): Query<LogQuery>,
) -> Result<Response, ApiError> {
    if !STREAMS.contains(&stream.as_str()) {
        return Err(ApiError::not_found("log stream"));
    }
    principal.require(Permission::View)?;
    load_visible(&state, &principal, &id)?;

    let task = state
        .lifecycle
        .task_log_info(&id, &task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("task"))?;

    let n = query.n.unwrap_or(state.logdriver.backlog);
    let target = redirect_target(&state.logdriver.path, &task.host, &task.working_dir, &stream, n);
    let target = HeaderValue::from_str(&target).map_err(|_| {
        ApiError::new(StatusCode::BAD_GATEWAY, "task location is not a valid header value")
    })?;

    let mut resp = StatusCode::OK.into_response();
    resp.headers_mut().insert(ACCEL_REDIRECT, target);
    resp.headers_mut()
        .insert(ACCEL_BUFFERING, HeaderValue::from_static("no"));
    Ok(resp)
}
