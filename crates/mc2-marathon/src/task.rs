//! Scheduler tasks and where their sandboxes live.

use serde::{Deserialize, Serialize};

/// One running instance of an app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Full task id, `<app_id>.<uuid>`.
    pub id: String,
    pub host: String,
    pub agent_id: String,
    /// Sandbox directory on the agent.
    pub working_dir: String,
}

impl Task {
    /// The part after `<app_id>.`, which is what UIs show.
    pub fn short_id(&self) -> &str {
        self.id
            .split_once('.')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.id)
    }
}

/// Task entry as Marathon returns it from `/v2/apps/{id}/tasks`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarathonTask {
    pub id: String,
    pub host: String,
    pub slave_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TasksResponse {
    pub tasks: Vec<MarathonTask>,
}

/// `<work_dir>/slaves/<agent>/frameworks/<framework>/executors/<task>/runs/latest`
pub fn sandbox_dir(mesos_work_dir: &str, agent_id: &str, framework_id: &str, task_id: &str) -> String {
    format!(
        "{}/slaves/{agent_id}/frameworks/{framework_id}/executors/{task_id}/runs/latest",
        mesos_work_dir.trim_end_matches('/')
    )
}
