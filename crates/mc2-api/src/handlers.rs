//! Controller REST handlers.
//!
//! Every handler runs the auth gate first, then delegates to the
//! lifecycle. Remote side effects that fail after the record changed come
//! back as `warning` in the envelope rather than as an error status.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use mc2_lifecycle::LifecycleError;
use mc2_state::{Controller, ControllerSpec, ControllerState, ControllerSummary, NewController};

use crate::auth::{Permission, Principal};
use crate::response::{ApiError, ApiResponse};
use crate::ApiState;

/// Body of `POST /controllers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateControllerRequest {
    pub name: String,
    #[serde(flatten)]
    pub spec: ControllerSpec,
}

/// Body of `PUT /controllers/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateControllerRequest {
    #[serde(flatten)]
    pub spec: ControllerSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusView {
    pub state: ControllerState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    /// Short id, the part after `<app_id>.`.
    pub id: String,
    pub full_id: String,
    pub host: String,
}

/// Load a controller the caller may see. Deleted ones read as missing.
pub(crate) fn load_visible(
    state: &ApiState,
    principal: &Principal,
    id: &str,
) -> Result<Controller, ApiError> {
    match state.lifecycle.store().get_controller(id)? {
        Some(c) if principal.can_see(&c) && c.state() != ControllerState::Deleted => Ok(c),
        _ => Err(ApiError::not_found("controller")),
    }
}

/// GET /api/v1/controllers
pub async fn list_controllers(
    State(state): State<ApiState>,
    principal: Principal,
) -> Result<Response, ApiError> {
    principal.require(Permission::View)?;

    let store = state.lifecycle.store();
    let controllers = match &principal.organization_id {
        Some(org) => store.list_controllers_for_org(org)?,
        None if principal.superuser => store
            .list_controllers()?
            .into_iter()
            .filter(|c| c.state() != ControllerState::Deleted)
            .collect(),
        None => Vec::new(),
    };

    let summaries: Vec<ControllerSummary> = controllers.iter().map(Controller::summary).collect();
    Ok(ApiResponse::ok(summaries).into_response())
}

/// POST /api/v1/controllers
pub async fn create_controller(
    State(state): State<ApiState>,
    principal: Principal,
    Json(req): Json<CreateControllerRequest>,
) -> Result<Response, ApiError> {
    principal.require(Permission::Add)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "name is required"));
    }
    let organization_id = principal.organization_id.clone().ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "an organization is required to create controllers",
        )
    })?;

    let controller = state
        .lifecycle
        .create(NewController {
            name: name.to_string(),
            organization_id,
            owner_id: principal.user_id.clone(),
            spec: req.spec,
        })
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(controller.summary())).into_response())
}

/// GET /api/v1/controllers/{id}
pub async fn get_controller(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.require(Permission::View)?;
    let controller = load_visible(&state, &principal, &id)?;
    Ok(ApiResponse::ok(controller.summary()).into_response())
}

/// PUT /api/v1/controllers/{id}
pub async fn update_controller(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateControllerRequest>,
) -> Result<Response, ApiError> {
    principal.require(Permission::Change)?;
    load_visible(&state, &principal, &id)?;

    let outcome = state.lifecycle.edit(&id, req.spec).await?;
    Ok(ApiResponse::with_warning(outcome.value.summary(), outcome.warning).into_response())
}

/// DELETE /api/v1/controllers/{id}
pub async fn delete_controller(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.require(Permission::Delete)?;
    load_visible(&state, &principal, &id)?;

    let outcome = state.lifecycle.delete(&id).await?;
    Ok(ApiResponse::with_warning(outcome.value.summary(), outcome.warning).into_response())
}

/// POST /api/v1/controllers/{id}/restart
pub async fn restart_controller(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.require(Permission::Change)?;
    load_visible(&state, &principal, &id)?;

    let outcome = state.lifecycle.restart(&id).await?;
    Ok(ApiResponse::with_warning(outcome.value.summary(), outcome.warning).into_response())
}

/// POST /api/v1/controllers/{id}/retry
pub async fn retry_controller(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.require(Permission::Change)?;
    load_visible(&state, &principal, &id)?;

    let controller = state.lifecycle.retry(&id).await?;
    Ok(ApiResponse::ok(controller.summary()).into_response())
}

/// GET /api/v1/controllers/{id}/status
///
/// Reconciles first. If the scheduler can't be reached the stored state
/// is returned with a warning.
pub async fn controller_status(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.require(Permission::View)?;
    let controller = load_visible(&state, &principal, &id)?;

    match state.lifecycle.reconcile(&id).await {
        Ok(current) => Ok(ApiResponse::ok(StatusView { state: current }).into_response()),
        Err(LifecycleError::Scheduler(e)) => {
            tracing::warn!(controller = %id, error = %e, "status reconcile failed");
            Ok(ApiResponse::with_warning(
                StatusView {
                    state: controller.state(),
                },
                Some(format!("Unable to reach the scheduler: {e}")),
            )
            .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/v1/controllers/{id}/tasks
pub async fn list_tasks(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.require(Permission::View)?;
    load_visible(&state, &principal, &id)?;

    let tasks: Vec<TaskView> = state
        .lifecycle
        .list_tasks(&id)
        .await?
        .into_iter()
        .map(|t| TaskView {
            id: t.short_id().to_string(),
            full_id: t.id.clone(),
            host: t.host,
        })
        .collect();
    Ok(ApiResponse::ok(tasks).into_response())
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{principal, test_state};

    async fn created(state: &ApiState, org: &str) -> ControllerSummary {
        let resp = create_controller(
            State(state.clone()),
            principal(org, "view,add,change,delete"),
            Json(CreateControllerRequest {
                name: "Test App".to_string(),
                spec: ControllerSpec {
                    cmd: Some("ping".to_string()),
                    ..Default::default()
                },
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let c = state.lifecycle.store().list_controllers_for_org(org).unwrap();
        c.last().unwrap().summary()
    }

    #[tokio::test]
    async fn create_returns_pending_controller() {
        let (state, _) = test_state().await;
        let summary = created(&state, "org-1").await;
        assert_eq!(summary.state, ControllerState::Pending);
        assert!(summary.app_id.starts_with("test-app-"));
    }

    #[tokio::test]
    async fn create_requires_add() {
        let (state, _) = test_state().await;
        let err = create_controller(
            State(state),
            principal("org-1", "view"),
            Json(CreateControllerRequest {
                name: "x".to_string(),
                spec: ControllerSpec::default(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let (state, _) = test_state().await;
        let err = create_controller(
            State(state),
            principal("org-1", "add"),
            Json(CreateControllerRequest {
                name: "   ".to_string(),
                spec: ControllerSpec::default(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_org_reads_as_not_found() {
        let (state, _) = test_state().await;
        let summary = created(&state, "org-1").await;

        let err = get_controller(
            State(state.clone()),
            principal("org-2", "view"),
            Path(summary.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let resp = get_controller(State(state), principal("org-1", "view"), Path(summary.id))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_is_scoped_to_org() {
        let (state, _) = test_state().await;
        created(&state, "org-1").await;
        created(&state, "org-2").await;

        let resp = list_controllers(State(state.clone()), principal("org-1", "view"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            state.lifecycle.store().list_controllers_for_org("org-1").unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_then_missing() {
        let (state, _) = test_state().await;
        let summary = created(&state, "org-1").await;
        state.lifecycle.run_create(&summary.id).await.unwrap();

        let resp = delete_controller(
            State(state.clone()),
            principal("org-1", "delete"),
            Path(summary.id.clone()),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let err = get_controller(State(state), principal("org-1", "view"), Path(summary.id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_of_pending_conflicts() {
        let (state, _) = test_state().await;
        let summary = created(&state, "org-1").await;
        let err = delete_controller(State(state), principal("org-1", "delete"), Path(summary.id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn status_falls_back_when_scheduler_down() {
        let (state, scheduler) = test_state().await;
        let summary = created(&state, "org-1").await;
        state.lifecycle.run_create(&summary.id).await.unwrap();
        scheduler.set_down(true);

        let resp = controller_status(State(state), principal("org-1", "view"), Path(summary.id))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tasks_use_short_ids() {
        let (state, scheduler) = test_state().await;
        let summary = created(&state, "org-1").await;
        scheduler.add_task(&summary.app_id, "abc", "agent-1");

        let resp = list_tasks(State(state), principal("org-1", "view"), Path(summary.id))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn restart_requires_change() {
        let (state, _) = test_state().await;
        let summary = created(&state, "org-1").await;
        let err = restart_controller(State(state), principal("org-1", "view"), Path(summary.id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn create_request_flattens_spec() {
        let req: CreateControllerRequest = serde_json::from_value(serde_json::json!({
            "name": "Web",
            "cmd": "ping",
            "port": 8080,
            "domain_urls": "a.com b.com"
        }))
        .unwrap();
        assert_eq!(req.name, "Web");
        assert_eq!(req.spec.cmd.as_deref(), Some("ping"));
        assert_eq!(req.spec.port, Some(8080));
        assert_eq!(req.spec.domain_urls, "a.com b.com");
    }
}
