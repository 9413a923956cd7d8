//! Shared fixtures for handler tests.

use std::sync::Arc;

use mc2_configs::ConfigManager;
use mc2_core::LogDriverConfig;
use mc2_lifecycle::{ChannelQueue, ControllerLifecycle};
use mc2_marathon::testing::FakeScheduler;
use mc2_state::StateStore;

use crate::auth::{Permission, Principal};
use crate::ApiState;

pub async fn test_state() -> (ApiState, Arc<FakeScheduler>) {
    let scheduler = Arc::new(FakeScheduler::default());
    let (queue, _jobs) = ChannelQueue::new();
    let lifecycle = ControllerLifecycle::new(
        StateStore::open_in_memory().unwrap(),
        scheduler.clone(),
        Arc::new(ConfigManager::new("qa", None).await.unwrap()),
        Arc::new(queue),
        "hub.example.org",
    );
    let state = ApiState {
        lifecycle: Arc::new(lifecycle),
        logdriver: LogDriverConfig::default(),
    };
    (state, scheduler)
}

pub fn principal(org: &str, permissions: &str) -> Principal {
    Principal {
        user_id: "user-1".to_string(),
        organization_id: Some(org.to_string()),
        permissions: permissions.split(',').filter_map(Permission::parse).collect(),
        superuser: false,
    }
}
