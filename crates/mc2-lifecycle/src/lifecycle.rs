//! Controller lifecycle orchestration.
//!
//! `ControllerLifecycle` is the only place that changes a controller's
//! state. Every operation on one controller id runs under that id's
//! async mutex, reads the record fresh from the store, applies at most
//! one transition, persists it, then runs the post-transition hooks.
//!
//! ```text
//! create ──▶ initial ─start─▶ pending ──enqueue──▶ JobWorker
//!                                                    │
//!                                           run_create (idempotent)
//!                                       submit ─▶ write configs
//!                                 ok ─▶ done   timeout ─▶ pending   err ─▶ failed
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use mc2_configs::{deploy_name, layout, ArtifactKind, ConfigError, ConfigManager};
use mc2_marathon::{build_app_spec, SchedulerClient, Task};
use mc2_state::{
    Controller, ControllerId, ControllerSpec, ControllerState, DeploymentTarget, LifecycleAction,
    NewController, StateStore,
};

use crate::error::{LifecycleError, LifecycleResult};
use crate::hooks::{TransitionEvent, TransitionHook};
use crate::jobs::{Job, JobQueue};

/// Result of a user action whose side effect may have partially failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome<T> {
    pub value: T,
    /// Set when the record was updated but a remote side effect failed.
    pub warning: Option<String>,
}

impl<T> ActionOutcome<T> {
    fn ok(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }
}

pub struct ControllerLifecycle {
    store: StateStore,
    scheduler: Arc<dyn SchedulerClient>,
    configs: Arc<ConfigManager>,
    queue: Arc<dyn JobQueue>,
    hub_domain: String,
    hooks: Vec<TransitionHook>,
    locks: Mutex<HashMap<ControllerId, Arc<AsyncMutex<()>>>>,
    /// Ids with a creation job queued or running.
    queued: Mutex<HashSet<ControllerId>>,
}

impl ControllerLifecycle {
    pub fn new(
        store: StateStore,
        scheduler: Arc<dyn SchedulerClient>,
        configs: Arc<ConfigManager>,
        queue: Arc<dyn JobQueue>,
        hub_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            scheduler,
            configs,
            queue,
            hub_domain: hub_domain.into(),
            hooks: Vec::new(),
            locks: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashSet::new()),
        }
    }

    /// Append a post-transition hook. Hooks run in the order added.
    pub fn with_hook(mut self, hook: TransitionHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn hub_domain(&self) -> &str {
        &self.hub_domain
    }

    /// Load a controller or fail with `NotFound`.
    pub fn get(&self, id: &str) -> LifecycleResult<Controller> {
        self.store
            .get_controller(id)?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    /// Persist a new controller, move it to `pending` and queue its creation.
    pub async fn create(&self, new: NewController) -> LifecycleResult<Controller> {
        validate_spec(&new.spec)?;

        let mut controller = Controller::new(new);
        self.store.insert_controller(&controller)?;
        info!(controller = %controller.id, app_id = %controller.app_id, "controller created");

        let _guard = self.lock(&controller.id).await;
        self.transition(&mut controller, LifecycleAction::Start)
            .await?;
        self.enqueue_start(&controller.id).await;
        Ok(controller)
    }

    /// Creation job body. A no-op unless the controller is `pending`.
    pub async fn run_create(&self, id: &str) -> LifecycleResult<ControllerState> {
        let _guard = self.lock(id).await;
        let _queued = QueuedMark { lifecycle: self, id };
        let mut controller = self.get(id)?;
        if controller.state() != ControllerState::Pending {
            debug!(controller = %id, state = %controller.state(), "not pending, skipping creation");
            return Ok(controller.state());
        }

        match self.apply_create_effects(&controller).await {
            Ok(()) => {
                controller.last_error = None;
                self.transition(&mut controller, LifecycleAction::Complete)
                    .await?;
            }
            Err(LifecycleError::Scheduler(e)) if e.is_timeout() => {
                warn!(
                    controller = %id,
                    app_id = %controller.app_id,
                    error = %e,
                    "scheduler timed out, controller stays pending"
                );
            }
            Err(e) => {
                warn!(controller = %id, app_id = %controller.app_id, error = %e, "creation failed");
                controller.last_error = Some(e.to_string());
                self.transition(&mut controller, LifecycleAction::Fail)
                    .await?;
            }
        }
        Ok(controller.state())
    }

    /// Submit the app and write its configs. Safe to repeat.
    pub async fn apply_create_effects(&self, controller: &Controller) -> LifecycleResult<()> {
        let app = build_app_spec(controller, &self.hub_domain);
        self.scheduler.submit(&app).await?;
        debug!(app_id = %controller.app_id, "app submitted");

        if let Some(target) = &controller.spec.deployment {
            self.write_configs(target)
                .await
                .map_err(|source| LifecycleError::PartialFailure {
                    app_id: controller.app_id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Replace the spec. When `done`, the new spec is pushed to the
    /// scheduler; a failure there is returned as a warning.
    pub async fn edit(
        &self,
        id: &str,
        spec: ControllerSpec,
    ) -> LifecycleResult<ActionOutcome<Controller>> {
        validate_spec(&spec)?;

        let _guard = self.lock(id).await;
        let mut controller = self.live(id)?;
        let previous = controller.spec.deployment.clone();
        controller.update_spec(spec);
        self.store.put_controller(&controller)?;
        info!(controller = %id, app_id = %controller.app_id, "controller spec updated");

        let mut warnings = Vec::new();
        if controller.state() == ControllerState::Done {
            self.push_edit(&controller, &mut warnings).await;
        }

        // Artifacts of a target the controller no longer uses.
        if let Some(old) = previous
            && !same_deploy(&old, controller.spec.deployment.as_ref())
            && let Err(e) = self.configs.destroy(&old.app_type, &old.country).await
        {
            warn!(controller = %id, app_id = %controller.app_id, error = %e, "old config teardown failed");
            warnings.push(format!(
                "Failed to remove old configs for {}: {e}",
                controller.app_id
            ));
        }

        Ok(ActionOutcome {
            value: controller,
            warning: join_warnings(warnings),
        })
    }

    /// Push an edited `done` controller to the scheduler and rewrite its
    /// configs. Failures become warnings.
    async fn push_edit(&self, controller: &Controller, warnings: &mut Vec<String>) {
        let id = &controller.id;
        let app = build_app_spec(controller, &self.hub_domain);
        if let Err(e) = self.scheduler.update(&app).await {
            warn!(controller = %id, app_id = %controller.app_id, error = %e, "scheduler update failed");
            warnings.push(format!("Failed to update {} on the scheduler: {e}", controller.app_id));
        }
        if let Some(target) = &controller.spec.deployment
            && let Err(e) = self.write_configs(target).await
        {
            warn!(controller = %id, app_id = %controller.app_id, error = %e, "config rewrite failed");
            warnings.push(format!("Failed to write configs for {}: {e}", controller.app_id));
        }
    }

    /// Restart on the scheduler. Never changes state.
    pub async fn restart(&self, id: &str) -> LifecycleResult<ActionOutcome<Controller>> {
        let _guard = self.lock(id).await;
        let controller = self.live(id)?;

        let warning = match self.scheduler.restart(&controller.app_id).await {
            Ok(()) => {
                info!(controller = %id, app_id = %controller.app_id, "app restarted");
                None
            }
            Err(e) => {
                warn!(controller = %id, app_id = %controller.app_id, error = %e, "restart failed");
                Some(format!("Failed to restart {}: {e}", controller.app_id))
            }
        };
        Ok(ActionOutcome {
            value: controller,
            warning,
        })
    }

    /// Tear down remotely, then soft-delete, then remove configs.
    ///
    /// A scheduler failure aborts with the state untouched. A config
    /// failure after the transition is only a warning.
    pub async fn delete(&self, id: &str) -> LifecycleResult<ActionOutcome<Controller>> {
        let _guard = self.lock(id).await;
        let mut controller = self.get(id)?;
        controller.state().next(LifecycleAction::Delete)?;

        self.scheduler.delete(&controller.app_id).await?;
        self.transition(&mut controller, LifecycleAction::Delete)
            .await?;

        let mut warning = None;
        if let Some(target) = &controller.spec.deployment
            && let Err(e) = self.configs.destroy(&target.app_type, &target.country).await
        {
            warn!(controller = %id, app_id = %controller.app_id, error = %e, "config teardown failed");
            warning = Some(format!("Failed to remove configs for {}: {e}", controller.app_id));
        }

        Ok(ActionOutcome {
            value: controller,
            warning,
        })
    }

    /// Compare with the scheduler and correct `done`/`missing` drift.
    pub async fn reconcile(&self, id: &str) -> LifecycleResult<ControllerState> {
        let _guard = self.lock(id).await;
        let mut controller = self.get(id)?;

        let action = match controller.state() {
            ControllerState::Done | ControllerState::Missing => {
                let exists = self.scheduler.exists(&controller.app_id).await?;
                match (controller.state(), exists) {
                    (ControllerState::Done, false) => Some(LifecycleAction::Missing),
                    (ControllerState::Missing, true) => Some(LifecycleAction::Activate),
                    _ => None,
                }
            }
            _ => None,
        };

        if let Some(action) = action {
            self.transition(&mut controller, action).await?;
        }
        Ok(controller.state())
    }

    /// `failed → pending` and queue creation again.
    pub async fn retry(&self, id: &str) -> LifecycleResult<Controller> {
        let _guard = self.lock(id).await;
        let mut controller = self.get(id)?;
        self.transition(&mut controller, LifecycleAction::Retry)
            .await?;
        self.enqueue_start(id).await;
        Ok(controller)
    }

    /// Queue the creation job for a controller that is still `pending`.
    ///
    /// Returns `false` without enqueueing when a job for `id` is already
    /// queued or running, or when the queue refused it.
    pub async fn enqueue_start(&self, id: &str) -> bool {
        if !self.queued_set().insert(id.to_string()) {
            debug!(controller = %id, "creation job already queued");
            return false;
        }
        let job = Job::StartController { id: id.to_string() };
        if let Err(e) = self.queue.enqueue(job).await {
            self.queued_set().remove(id);
            // The poller re-enqueues pending controllers.
            warn!(controller = %id, error = %e, "failed to enqueue creation job");
            return false;
        }
        true
    }

    fn queued_set(&self) -> std::sync::MutexGuard<'_, HashSet<ControllerId>> {
        self.queued.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn list_tasks(&self, id: &str) -> LifecycleResult<Vec<Task>> {
        let controller = self.live(id)?;
        Ok(self.scheduler.list_tasks(&controller.app_id).await?)
    }

    /// Find one task by its short id (the part after `<app_id>.`).
    pub async fn task_log_info(&self, id: &str, task_id: &str) -> LifecycleResult<Option<Task>> {
        let controller = self.live(id)?;
        let full_id = format!("{}.{task_id}", controller.app_id);
        let tasks = self.scheduler.list_tasks(&controller.app_id).await?;
        Ok(tasks.into_iter().find(|t| t.id == full_id))
    }

    /// Load a controller that hasn't been deleted.
    fn live(&self, id: &str) -> LifecycleResult<Controller> {
        let controller = self.get(id)?;
        if controller.state() == ControllerState::Deleted {
            return Err(LifecycleError::Deleted(id.to_string()));
        }
        Ok(controller)
    }

    async fn write_configs(&self, target: &DeploymentTarget) -> Result<(), ConfigError> {
        let (app_type, country) = (target.app_type.as_str(), target.country.as_str());
        self.configs
            .write_frontend_config(app_type, country, target.custom_domain.as_deref())
            .await?;
        self.configs.write_cms_config(app_type, country).await?;
        self.configs
            .write_supervisor_config(ArtifactKind::Frontend, app_type, country)
            .await?;
        self.configs
            .write_supervisor_config(ArtifactKind::Cms, app_type, country)
            .await?;
        Ok(())
    }

    /// Apply, persist, then notify hooks.
    async fn transition(
        &self,
        controller: &mut Controller,
        action: LifecycleAction,
    ) -> LifecycleResult<()> {
        let transition = controller.apply(action)?;
        self.store.put_controller(controller)?;

        let event = TransitionEvent {
            controller_id: controller.id.clone(),
            app_id: controller.app_id.clone(),
            transition,
        };
        for hook in &self.hooks {
            hook(event.clone()).await;
        }
        Ok(())
    }

    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Only the map holds an idle entry.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Clears the queued mark for one id when the creation job body exits.
struct QueuedMark<'a> {
    lifecycle: &'a ControllerLifecycle,
    id: &'a str,
}

impl Drop for QueuedMark<'_> {
    fn drop(&mut self) {
        self.lifecycle.queued_set().remove(self.id);
    }
}

/// Reject names and domains that would end up unescaped in configs or
/// scheduler labels.
fn validate_spec(spec: &ControllerSpec) -> LifecycleResult<()> {
    layout::validate_domains("domain_urls", &spec.domain_urls)?;
    if let Some(target) = &spec.deployment {
        layout::validate_target(&target.app_type, &target.country)?;
        if let Some(domain) = &target.custom_domain {
            layout::validate_domains("custom_domain", domain)?;
        }
    }
    Ok(())
}

/// Whether `new` maps onto the same artifact files as `old`.
fn same_deploy(old: &DeploymentTarget, new: Option<&DeploymentTarget>) -> bool {
    new.is_some_and(|new| {
        deploy_name(&old.app_type, &old.country) == deploy_name(&new.app_type, &new.country)
    })
}

fn join_warnings(warnings: Vec<String>) -> Option<String> {
    if warnings.is_empty() {
        None
    } else {
        Some(warnings.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::broadcast_hook;
    use crate::jobs::ChannelQueue;
    use mc2_marathon::testing::{FakeMode, FakeScheduler};
    use mc2_configs::{VersionedWorkspace, WorkspaceSettings};
    use mc2_state::InvalidTransition;
    use tokio::sync::{broadcast, mpsc};

    struct Harness {
        lifecycle: Arc<ControllerLifecycle>,
        scheduler: Arc<FakeScheduler>,
        jobs: mpsc::UnboundedReceiver<Job>,
    }

    async fn harness_with(configs: ConfigManager) -> Harness {
        let scheduler = Arc::new(FakeScheduler::default());
        let (queue, jobs) = ChannelQueue::new();
        let lifecycle = ControllerLifecycle::new(
            StateStore::open_in_memory().unwrap(),
            scheduler.clone(),
            Arc::new(configs),
            Arc::new(queue),
            "hub.example.org",
        );
        Harness {
            lifecycle: Arc::new(lifecycle),
            scheduler,
            jobs,
        }
    }

    async fn harness() -> Harness {
        harness_with(ConfigManager::new("qa", None).await.unwrap()).await
    }

    fn new_controller(name: &str) -> NewController {
        NewController {
            name: name.to_string(),
            organization_id: "org-1".to_string(),
            owner_id: "user-1".to_string(),
            spec: ControllerSpec {
                cmd: Some("ping".to_string()),
                image: Some("docker/image".to_string()),
                ..Default::default()
            },
        }
    }

    async fn created_done(h: &Harness, name: &str) -> Controller {
        let c = h.lifecycle.create(new_controller(name)).await.unwrap();
        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Done);
        h.lifecycle.get(&c.id).unwrap()
    }

    #[tokio::test]
    async fn create_moves_to_pending_and_enqueues() {
        let mut h = harness().await;
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();

        assert_eq!(c.state(), ControllerState::Pending);
        assert_eq!(
            h.lifecycle.get(&c.id).unwrap().state(),
            ControllerState::Pending
        );
        assert_eq!(
            h.jobs.try_recv().unwrap(),
            Job::StartController { id: c.id.clone() }
        );
        assert!(h.scheduler.submitted().is_empty());
    }

    #[tokio::test]
    async fn run_create_submits_and_completes() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;

        assert_eq!(c.state(), ControllerState::Done);
        assert_eq!(c.last_error, None);
        let submitted = h.scheduler.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].id, c.app_id);
        assert_eq!(submitted[0].cmd.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn run_create_is_noop_unless_pending() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;

        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Done);
        assert_eq!(h.scheduler.submitted().len(), 1);
    }

    #[tokio::test]
    async fn repeated_effects_submit_identical_specs() {
        let h = harness().await;
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();

        h.lifecycle.apply_create_effects(&c).await.unwrap();
        h.lifecycle.apply_create_effects(&c).await.unwrap();

        let submitted = h.scheduler.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].to_json(), submitted[1].to_json());
    }

    #[tokio::test]
    async fn scheduler_error_fails_with_last_error() {
        let h = harness().await;
        h.scheduler.set_submit(FakeMode::Status(500));
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();

        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Failed);
        let stored = h.lifecycle.get(&c.id).unwrap();
        assert!(stored.last_error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn scheduler_timeout_stays_pending() {
        let h = harness().await;
        h.scheduler.set_submit(FakeMode::Timeout);
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();

        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Pending);
        assert_eq!(h.lifecycle.get(&c.id).unwrap().last_error, None);
    }

    #[tokio::test]
    async fn retry_after_failure_completes() {
        let mut h = harness().await;
        h.scheduler.set_submit(FakeMode::Status(500));
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();
        h.lifecycle.run_create(&c.id).await.unwrap();
        let _ = h.jobs.try_recv();

        h.scheduler.set_submit(FakeMode::Ok);
        let retried = h.lifecycle.retry(&c.id).await.unwrap();
        assert_eq!(retried.state(), ControllerState::Pending);
        assert_eq!(
            h.jobs.try_recv().unwrap(),
            Job::StartController { id: c.id.clone() }
        );

        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Done);
        assert_eq!(h.lifecycle.get(&c.id).unwrap().last_error, None);
    }

    #[tokio::test]
    async fn retry_requires_failed() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;
        let err = h.lifecycle.retry(&c.id).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition(InvalidTransition {
                from: ControllerState::Done,
                action: LifecycleAction::Retry,
            })
        ));
    }

    #[tokio::test]
    async fn reconcile_marks_missing_then_active() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;

        h.scheduler.remove_app(&c.app_id);
        assert_eq!(h.lifecycle.reconcile(&c.id).await.unwrap(), ControllerState::Missing);
        // A second pass with the same observation changes nothing.
        assert_eq!(h.lifecycle.reconcile(&c.id).await.unwrap(), ControllerState::Missing);

        h.scheduler.add_app(&c.app_id);
        assert_eq!(h.lifecycle.reconcile(&c.id).await.unwrap(), ControllerState::Done);
    }

    #[tokio::test]
    async fn reconcile_ignores_other_states() {
        let h = harness().await;
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();
        assert_eq!(h.lifecycle.reconcile(&c.id).await.unwrap(), ControllerState::Pending);
        assert_eq!(h.scheduler.exists_calls(), 0);
    }

    #[tokio::test]
    async fn edit_when_done_pushes_update() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;

        let mut spec = c.spec.clone();
        spec.instances = Some(3);
        let outcome = h.lifecycle.edit(&c.id, spec).await.unwrap();

        assert_eq!(outcome.warning, None);
        assert_eq!(outcome.value.state(), ControllerState::Done);
        assert_eq!(h.scheduler.updated().len(), 1);
        assert_eq!(h.scheduler.updated()[0].instances, 3);
        assert_eq!(h.lifecycle.get(&c.id).unwrap().spec.instances, Some(3));
    }

    #[tokio::test]
    async fn edit_failure_is_a_warning() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;
        h.scheduler.set_update(FakeMode::Status(503));

        let outcome = h.lifecycle.edit(&c.id, c.spec.clone()).await.unwrap();
        assert!(outcome.warning.unwrap().contains(&c.app_id));
        assert_eq!(h.lifecycle.get(&c.id).unwrap().state(), ControllerState::Done);
    }

    #[tokio::test]
    async fn edit_when_pending_only_persists() {
        let h = harness().await;
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();
        let mut spec = c.spec.clone();
        spec.cmd = Some("pong".to_string());

        let outcome = h.lifecycle.edit(&c.id, spec).await.unwrap();
        assert_eq!(outcome.warning, None);
        assert!(h.scheduler.updated().is_empty());
        assert_eq!(
            h.lifecycle.get(&c.id).unwrap().spec.cmd.as_deref(),
            Some("pong")
        );
    }

    #[tokio::test]
    async fn restart_failure_is_a_warning() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;

        let ok = h.lifecycle.restart(&c.id).await.unwrap();
        assert_eq!(ok.warning, None);
        assert_eq!(h.scheduler.restarted(), vec![c.app_id.clone()]);

        h.scheduler.set_restart(FakeMode::Status(500));
        let failed = h.lifecycle.restart(&c.id).await.unwrap();
        assert!(failed.warning.is_some());
        assert_eq!(failed.value.state(), ControllerState::Done);
    }

    #[tokio::test]
    async fn delete_is_remote_first_then_soft() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;

        let outcome = h.lifecycle.delete(&c.id).await.unwrap();
        assert_eq!(outcome.value.state(), ControllerState::Deleted);
        assert_eq!(h.scheduler.deleted(), vec![c.app_id.clone()]);

        // Kept as a record, app id still reserved.
        let stored = h.lifecycle.get(&c.id).unwrap();
        assert_eq!(stored.state(), ControllerState::Deleted);
        assert_eq!(
            h.lifecycle.store().controller_id_for_app(&c.app_id).unwrap(),
            Some(c.id.clone())
        );
    }

    #[tokio::test]
    async fn delete_failure_keeps_state() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;
        h.scheduler.set_delete(FakeMode::Status(500));

        let err = h.lifecycle.delete(&c.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Scheduler(_)));
        assert_eq!(h.lifecycle.get(&c.id).unwrap().state(), ControllerState::Done);
    }

    #[tokio::test]
    async fn deleted_rejects_everything() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;
        h.lifecycle.delete(&c.id).await.unwrap();

        assert!(matches!(
            h.lifecycle.delete(&c.id).await.unwrap_err(),
            LifecycleError::InvalidTransition(_)
        ));
        assert!(matches!(
            h.lifecycle.retry(&c.id).await.unwrap_err(),
            LifecycleError::InvalidTransition(_)
        ));
        assert!(matches!(
            h.lifecycle.restart(&c.id).await.unwrap_err(),
            LifecycleError::Deleted(_)
        ));
        assert!(matches!(
            h.lifecycle.edit(&c.id, c.spec.clone()).await.unwrap_err(),
            LifecycleError::Deleted(_)
        ));
        assert_eq!(h.lifecycle.reconcile(&c.id).await.unwrap(), ControllerState::Deleted);
        assert_eq!(h.scheduler.deleted().len(), 1);
    }

    #[tokio::test]
    async fn pending_cannot_be_deleted() {
        let h = harness().await;
        let c = h.lifecycle.create(new_controller("Test App")).await.unwrap();
        assert!(matches!(
            h.lifecycle.delete(&c.id).await.unwrap_err(),
            LifecycleError::InvalidTransition(_)
        ));
        assert!(h.scheduler.deleted().is_empty());
    }

    #[tokio::test]
    async fn unknown_controller_is_not_found() {
        let h = harness().await;
        assert!(matches!(
            h.lifecycle.run_create("nope").await.unwrap_err(),
            LifecycleError::NotFound(_)
        ));
        assert!(matches!(
            h.lifecycle.reconcile("nope").await.unwrap_err(),
            LifecycleError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn invalid_target_rejected_before_insert() {
        let h = harness().await;
        let mut new = new_controller("Test App");
        new.spec.deployment = Some(DeploymentTarget {
            app_type: "../etc".to_string(),
            country: "za".to_string(),
            custom_domain: None,
        });
        let err = h.lifecycle.create(new).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Config(ConfigError::InvalidTarget(_))));
        assert!(h.lifecycle.store().list_controllers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn task_lookup_by_short_id() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;
        h.scheduler.add_task(&c.app_id, "t1", "agent-1");

        let tasks = h.lifecycle.list_tasks(&c.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].short_id(), "t1");

        let task = h.lifecycle.task_log_info(&c.id, "t1").await.unwrap().unwrap();
        assert_eq!(task.host, "agent-1");
        assert!(h.lifecycle.task_log_info(&c.id, "t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hooks_see_every_transition_in_order() {
        let scheduler = Arc::new(FakeScheduler::default());
        let (queue, _jobs) = ChannelQueue::new();
        let (tx, mut rx) = broadcast::channel(16);
        let lifecycle = ControllerLifecycle::new(
            StateStore::open_in_memory().unwrap(),
            scheduler,
            Arc::new(ConfigManager::new("qa", None).await.unwrap()),
            Arc::new(queue),
            "hub",
        )
        .with_hook(crate::hooks::log_hook())
        .with_hook(broadcast_hook(tx));

        let c = lifecycle.create(new_controller("Test App")).await.unwrap();
        lifecycle.run_create(&c.id).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.transition.action, LifecycleAction::Start);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.transition.action, LifecycleAction::Complete);
        assert_eq!(second.controller_id, c.id);
        assert_eq!(second.app_id, c.app_id);
    }

    #[tokio::test]
    async fn concurrent_reconciles_transition_once() {
        let h = harness().await;
        let c = created_done(&h, "Test App").await;
        h.scheduler.remove_app(&c.app_id);

        let (a, b) = tokio::join!(h.lifecycle.reconcile(&c.id), h.lifecycle.reconcile(&c.id));
        assert_eq!(a.unwrap(), ControllerState::Missing);
        assert_eq!(b.unwrap(), ControllerState::Missing);
    }

    #[tokio::test]
    async fn config_failure_after_submit_is_partial_failure() {
        if !crate::testing::git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let ws = VersionedWorkspace::open(dir.path(), WorkspaceSettings::default())
            .await
            .unwrap();
        let configs = ConfigManager::new("qa", Some(Arc::new(ws))).await.unwrap();
        let h = harness_with(configs).await;

        // A file where the nginx directory should be makes every write fail.
        std::fs::remove_dir_all(dir.path().join("nginx")).unwrap();
        std::fs::write(dir.path().join("nginx"), "not a dir").unwrap();

        let mut new = new_controller("Test App");
        new.spec.deployment = Some(DeploymentTarget {
            app_type: "ProdApp".to_string(),
            country: "ZA".to_string(),
            custom_domain: None,
        });
        let c = h.lifecycle.create(new).await.unwrap();

        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Failed);
        let stored = h.lifecycle.get(&c.id).unwrap();
        let last_error = stored.last_error.unwrap();
        assert!(last_error.contains(&c.app_id), "{last_error}");
        assert!(last_error.contains("submitted"), "{last_error}");
        assert_eq!(h.scheduler.submitted().len(), 1);
    }

    #[tokio::test]
    async fn create_with_target_writes_configs() {
        if !crate::testing::git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let ws = VersionedWorkspace::open(dir.path(), WorkspaceSettings::default())
            .await
            .unwrap();
        let configs = ConfigManager::new("qa", Some(Arc::new(ws))).await.unwrap();
        let h = harness_with(configs).await;

        let mut new = new_controller("Test App");
        new.spec.deployment = Some(DeploymentTarget {
            app_type: "ProdApp".to_string(),
            country: "ZA".to_string(),
            custom_domain: None,
        });
        let c = h.lifecycle.create(new).await.unwrap();
        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Done);

        for path in [
            "nginx/frontend_prodapp_za.conf",
            "nginx/cms_prodapp_za.conf",
            "supervisor/frontend_prodapp_za.conf",
            "supervisor/cms_prodapp_za.conf",
        ] {
            assert!(dir.path().join(path).is_file(), "{path} missing");
        }

        h.lifecycle.delete(&c.id).await.unwrap();
        assert!(!dir.path().join("nginx/frontend_prodapp_za.conf").exists());
    }

    async fn git_harness(dir: &std::path::Path) -> Harness {
        let ws = VersionedWorkspace::open(dir, WorkspaceSettings::default())
            .await
            .unwrap();
        harness_with(ConfigManager::new("qa", Some(Arc::new(ws))).await.unwrap()).await
    }

    fn target(app_type: &str, country: &str) -> Option<DeploymentTarget> {
        Some(DeploymentTarget {
            app_type: app_type.to_string(),
            country: country.to_string(),
            custom_domain: None,
        })
    }

    const ARTIFACTS: [&str; 4] = [
        "nginx/frontend_prodapp_za.conf",
        "nginx/cms_prodapp_za.conf",
        "supervisor/frontend_prodapp_za.conf",
        "supervisor/cms_prodapp_za.conf",
    ];

    #[tokio::test]
    async fn repeated_effects_leave_workspace_unchanged() {
        if !crate::testing::git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let h = git_harness(dir.path()).await;
        let mut new = new_controller("Test App");
        new.spec.deployment = target("ProdApp", "ZA");
        let c = h.lifecycle.create(new).await.unwrap();
        let ws = h.lifecycle.configs.workspace().unwrap();

        h.lifecycle.apply_create_effects(&c).await.unwrap();
        let mut first = Vec::new();
        for path in ARTIFACTS {
            let path = std::path::Path::new(path);
            first.push((
                ws.read(path).await.unwrap().unwrap(),
                ws.history(path).await.unwrap().len(),
            ));
        }

        h.lifecycle.apply_create_effects(&c).await.unwrap();
        for (path, (content, commits)) in ARTIFACTS.iter().zip(&first) {
            let path = std::path::Path::new(path);
            assert_eq!(&ws.read(path).await.unwrap().unwrap(), content, "{path:?}");
            assert_eq!(ws.history(path).await.unwrap().len(), *commits, "{path:?}");
            assert_eq!(*commits, 1);
        }

        let submitted = h.scheduler.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].to_json(), submitted[1].to_json());
    }

    #[tokio::test]
    async fn retargeting_removes_old_artifacts() {
        if !crate::testing::git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let h = git_harness(dir.path()).await;
        let mut new = new_controller("Test App");
        new.spec.deployment = target("ProdApp", "ZA");
        let c = h.lifecycle.create(new).await.unwrap();
        assert_eq!(h.lifecycle.run_create(&c.id).await.unwrap(), ControllerState::Done);

        let mut spec = h.lifecycle.get(&c.id).unwrap().spec;
        spec.deployment = target("Other", "ZA");
        let outcome = h.lifecycle.edit(&c.id, spec).await.unwrap();
        assert_eq!(outcome.warning, None);
        for path in ARTIFACTS {
            assert!(!dir.path().join(path).exists(), "{path} left behind");
        }
        assert!(dir.path().join("nginx/frontend_other_za.conf").is_file());

        // Same files, different case: nothing is removed.
        let mut spec = h.lifecycle.get(&c.id).unwrap().spec;
        spec.deployment = target("OTHER", "za");
        h.lifecycle.edit(&c.id, spec).await.unwrap();
        assert!(dir.path().join("nginx/frontend_other_za.conf").is_file());

        h.lifecycle.delete(&c.id).await.unwrap();
        assert!(!dir.path().join("nginx/frontend_other_za.conf").exists());
        assert!(!dir.path().join("nginx/frontend_prodapp_za.conf").exists());
    }

    #[tokio::test]
    async fn dropping_the_target_removes_its_artifacts() {
        if !crate::testing::git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let h = git_harness(dir.path()).await;
        let mut new = new_controller("Test App");
        new.spec.deployment = target("ProdApp", "ZA");
        let c = h.lifecycle.create(new).await.unwrap();
        h.lifecycle.run_create(&c.id).await.unwrap();

        let mut spec = h.lifecycle.get(&c.id).unwrap().spec;
        spec.deployment = None;
        h.lifecycle.edit(&c.id, spec).await.unwrap();
        for path in ARTIFACTS {
            assert!(!dir.path().join(path).exists(), "{path} left behind");
        }
    }

    #[tokio::test]
    async fn unsafe_domains_are_rejected() {
        let h = harness().await;

        let mut new = new_controller("Test App");
        new.spec.deployment = Some(DeploymentTarget {
            app_type: "ProdApp".to_string(),
            country: "ZA".to_string(),
            custom_domain: Some(
                "x.com;\n    location /admin { proxy_pass http://evil; }\n#".to_string(),
            ),
        });
        let err = h.lifecycle.create(new).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Config(ConfigError::InvalidTarget(_))));

        let mut new = new_controller("Test App");
        new.spec.domain_urls = "good.com bad.com\nevil".to_string();
        let err = h.lifecycle.create(new).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Config(ConfigError::InvalidTarget(_))));
        assert!(h.lifecycle.store().list_controllers().unwrap().is_empty());

        let c = created_done(&h, "Test App").await;
        let mut spec = c.spec.clone();
        spec.domain_urls = "a.com;b".to_string();
        let err = h.lifecycle.edit(&c.id, spec).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Config(ConfigError::InvalidTarget(_))));
        assert_eq!(h.lifecycle.get(&c.id).unwrap().spec.domain_urls, "");
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let h = harness().await;
        for name in ["a", "b", "c", "d"] {
            let c = created_done(&h, name).await;
            h.lifecycle.reconcile(&c.id).await.unwrap();
        }
        assert!(h.lifecycle.lock_entries() <= 1);
    }
}
