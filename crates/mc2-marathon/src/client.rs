//! Scheduler client seam and the Marathon HTTP implementation.
//!
//! Every call maps transport failures, timeouts, non-2xx responses and
//! unparseable bodies to a [`SchedulerError`]. Nothing is retried here:
//! the lifecycle decides what a failure means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use mc2_core::MarathonConfig;

use crate::app::AppSpec;
use crate::error::{SchedulerError, SchedulerResult};
use crate::task::{sandbox_dir, Task, TasksResponse};

/// Operations the lifecycle needs from the orchestrator.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Create the app. Resubmitting an existing app updates it instead.
    async fn submit(&self, app: &AppSpec) -> SchedulerResult<()>;

    /// Replace the definition of an existing app.
    async fn update(&self, app: &AppSpec) -> SchedulerResult<()>;

    async fn exists(&self, app_id: &str) -> SchedulerResult<bool>;

    async fn list_tasks(&self, app_id: &str) -> SchedulerResult<Vec<Task>>;

    async fn restart(&self, app_id: &str) -> SchedulerResult<()>;

    /// Tear the app down. An app that is already gone counts as deleted.
    async fn delete(&self, app_id: &str) -> SchedulerResult<()>;
}

/// Marathon REST client.
pub struct MarathonClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    mesos_work_dir: String,
    /// Fetched from `/v2/info` on first use.
    framework_id: OnceCell<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    framework_id: Option<String>,
}

#[derive(serde::Deserialize)]
struct AppResponse {
    #[allow(dead_code)]
    app: serde_json::Value,
}

impl MarathonClient {
    pub fn new(config: &MarathonConfig) -> SchedulerResult<Self> {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Self::from_parts(
            &config.host,
            config.timeout(),
            credentials,
            &config.mesos_work_dir,
        )
    }

    pub fn from_parts(
        base_url: &str,
        timeout: Duration,
        credentials: Option<(String, String)>,
        mesos_work_dir: &str,
    ) -> SchedulerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            mesos_work_dir: mesos_work_dir.to_string(),
            framework_id: OnceCell::new(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.credentials {
            Some((user, pass)) => rb.basic_auth(user, Some(pass)),
            None => rb,
        }
    }

    /// `PUT /v2/apps/{id}`. `force` overrides the lock a running
    /// deployment holds on the app.
    async fn put_app(&self, app: &AppSpec, force: bool) -> SchedulerResult<()> {
        let mut rb = self.request(Method::PUT, &format!("/v2/apps/{}", app.id));
        if force {
            rb = rb.query(&[("force", "true")]);
        }
        let resp = rb.json(app).send().await?;
        ensure_success(resp).await?;
        debug!(app_id = %app.id, force, "app updated");
        Ok(())
    }

    async fn framework_id(&self) -> SchedulerResult<String> {
        self.framework_id
            .get_or_try_init(|| async {
                let resp = self.request(Method::GET, "/v2/info").send().await?;
                let info: InfoResponse = parse_json(ensure_success(resp).await?).await?;
                let id = info
                    .framework_id
                    .ok_or_else(|| SchedulerError::Malformed("missing frameworkId".to_string()))?;
                debug!(framework_id = %id, "scheduler framework id resolved");
                Ok::<_, SchedulerError>(id)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl SchedulerClient for MarathonClient {
    async fn submit(&self, app: &AppSpec) -> SchedulerResult<()> {
        let resp = self
            .request(Method::POST, "/v2/apps")
            .json(app)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            // A resubmission can race the deployment the first POST started.
            info!(app_id = %app.id, "app already exists, forcing an update instead");
            return self.put_app(app, true).await;
        }
        ensure_success(resp).await?;
        info!(app_id = %app.id, "app submitted");
        Ok(())
    }

    async fn update(&self, app: &AppSpec) -> SchedulerResult<()> {
        self.put_app(app, false).await
    }

    async fn exists(&self, app_id: &str) -> SchedulerResult<bool> {
        let resp = self
            .request(Method::GET, &format!("/v2/apps/{app_id}"))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let _: AppResponse = parse_json(ensure_success(resp).await?).await?;
        Ok(true)
    }

    async fn list_tasks(&self, app_id: &str) -> SchedulerResult<Vec<Task>> {
        let resp = self
            .request(Method::GET, &format!("/v2/apps/{app_id}/tasks"))
            .send()
            .await?;
        let tasks: TasksResponse = parse_json(ensure_success(resp).await?).await?;
        if tasks.tasks.is_empty() {
            return Ok(Vec::new());
        }

        let framework_id = self.framework_id().await?;
        Ok(tasks
            .tasks
            .into_iter()
            .map(|t| Task {
                working_dir: sandbox_dir(&self.mesos_work_dir, &t.slave_id, &framework_id, &t.id),
                id: t.id,
                host: t.host,
                agent_id: t.slave_id,
            })
            .collect())
    }

    async fn restart(&self, app_id: &str) -> SchedulerResult<()> {
        let resp = self
            .request(Method::POST, &format!("/v2/apps/{app_id}/restart"))
            .send()
            .await?;
        ensure_success(resp).await?;
        info!(%app_id, "app restart requested");
        Ok(())
    }

    async fn delete(&self, app_id: &str) -> SchedulerResult<()> {
        let resp = self
            .request(Method::DELETE, &format!("/v2/apps/{app_id}"))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(%app_id, "app already absent on scheduler");
            return Ok(());
        }
        ensure_success(resp).await?;
        info!(%app_id, "app deleted");
        Ok(())
    }
}

async fn ensure_success(resp: Response) -> SchedulerResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SchedulerError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> SchedulerResult<T> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| SchedulerError::Malformed(e.to_string()))
}
