//! In-memory scheduler for tests in downstream crates.
//!
//! Enabled with the `test-util` feature.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::AppSpec;
use crate::client::SchedulerClient;
use crate::error::{SchedulerError, SchedulerResult};
use crate::task::{sandbox_dir, Task};

/// How one kind of call answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FakeMode {
    #[default]
    Ok,
    Timeout,
    Status(u16),
}

impl FakeMode {
    fn check(self) -> SchedulerResult<()> {
        match self {
            FakeMode::Ok => Ok(()),
            FakeMode::Timeout => Err(SchedulerError::Timeout("fake timeout".to_string())),
            FakeMode::Status(status) => Err(SchedulerError::Status {
                status,
                body: "fake failure".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct Inner {
    down: bool,
    apps: BTreeSet<String>,
    tasks: BTreeMap<String, Vec<Task>>,
    submitted: Vec<AppSpec>,
    updated: Vec<AppSpec>,
    restarted: Vec<String>,
    deleted: Vec<String>,
    exists_calls: usize,
    submit: FakeMode,
    update: FakeMode,
    restart: FakeMode,
    delete: FakeMode,
}

impl Inner {
    fn reachable(&self) -> SchedulerResult<()> {
        if self.down {
            Err(SchedulerError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Records every call and answers from in-memory app and task sets.
#[derive(Default)]
pub struct FakeScheduler {
    inner: Mutex<Inner>,
}

impl FakeScheduler {
    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        f(&mut self.inner.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Fail every call with a transport error until set back.
    pub fn set_down(&self, down: bool) {
        self.with(|i| i.down = down);
    }

    pub fn set_submit(&self, mode: FakeMode) {
        self.with(|i| i.submit = mode);
    }

    pub fn set_update(&self, mode: FakeMode) {
        self.with(|i| i.update = mode);
    }

    pub fn set_restart(&self, mode: FakeMode) {
        self.with(|i| i.restart = mode);
    }

    pub fn set_delete(&self, mode: FakeMode) {
        self.with(|i| i.delete = mode);
    }

    pub fn add_app(&self, app_id: &str) {
        self.with(|i| i.apps.insert(app_id.to_string()));
    }

    pub fn remove_app(&self, app_id: &str) {
        self.with(|i| i.apps.remove(app_id));
    }

    pub fn add_task(&self, app_id: &str, short_id: &str, host: &str) {
        let id = format!("{app_id}.{short_id}");
        let task = Task {
            working_dir: sandbox_dir("/tmp/mesos", "S1", "F1", &id),
            id,
            host: host.to_string(),
            agent_id: "S1".to_string(),
        };
        self.with(|i| i.tasks.entry(app_id.to_string()).or_default().push(task));
    }

    pub fn submitted(&self) -> Vec<AppSpec> {
        self.with(|i| i.submitted.clone())
    }

    pub fn updated(&self) -> Vec<AppSpec> {
        self.with(|i| i.updated.clone())
    }

    pub fn restarted(&self) -> Vec<String> {
        self.with(|i| i.restarted.clone())
    }

    pub fn deleted(&self) -> Vec<String> {
        self.with(|i| i.deleted.clone())
    }

    pub fn exists_calls(&self) -> usize {
        self.with(|i| i.exists_calls)
    }
}

#[async_trait]
impl SchedulerClient for FakeScheduler {
    async fn submit(&self, app: &AppSpec) -> SchedulerResult<()> {
        self.with(|i| {
            i.reachable()?;
            i.submit.check()?;
            i.submitted.push(app.clone());
            i.apps.insert(app.id.clone());
            Ok(())
        })
    }

    async fn update(&self, app: &AppSpec) -> SchedulerResult<()> {
        self.with(|i| {
            i.reachable()?;
            i.update.check()?;
            i.updated.push(app.clone());
            Ok(())
        })
    }

    async fn exists(&self, app_id: &str) -> SchedulerResult<bool> {
        self.with(|i| {
            i.reachable()?;
            i.exists_calls += 1;
            Ok(i.apps.contains(app_id))
        })
    }

    async fn list_tasks(&self, app_id: &str) -> SchedulerResult<Vec<Task>> {
        self.with(|i| {
            i.reachable()?;
            Ok(i.tasks.get(app_id).cloned().unwrap_or_default())
        })
    }

    async fn restart(&self, app_id: &str) -> SchedulerResult<()> {
        self.with(|i| {
            i.reachable()?;
            i.restart.check()?;
            i.restarted.push(app_id.to_string());
            Ok(())
        })
    }

    async fn delete(&self, app_id: &str) -> SchedulerResult<()> {
        self.with(|i| {
            i.reachable()?;
            i.delete.check()?;
            i.apps.remove(app_id);
            i.deleted.push(app_id.to_string());
            Ok(())
        })
    }
}
