//! Post-transition hooks.
//!
//! Hooks run in registration order after a transition has been
//! persisted. They observe; they cannot veto or alter the transition.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use mc2_state::{ControllerId, Transition};

/// One persisted state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub controller_id: ControllerId,
    pub app_id: String,
    pub transition: Transition,
}

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Async callback invoked with every transition.
pub type TransitionHook = Arc<dyn Fn(TransitionEvent) -> BoxFuture + Send + Sync>;

/// Structured log line per transition.
pub fn log_hook() -> TransitionHook {
    Arc::new(|event: TransitionEvent| {
        Box::pin(async move {
            info!(
                controller = %event.controller_id,
                app_id = %event.app_id,
                from = %event.transition.from,
                action = %event.transition.action,
                to = %event.transition.to,
                "controller transition"
            );
        })
    })
}

/// Publish every transition on a broadcast channel.
///
/// Having no subscribers is not an error.
pub fn broadcast_hook(tx: broadcast::Sender<TransitionEvent>) -> TransitionHook {
    Arc::new(move |event: TransitionEvent| {
        let _ = tx.send(event);
        Box::pin(async {})
    })
}
