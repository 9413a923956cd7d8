//! mc2-marathon — scheduler client for mc2.
//!
//! Translates controllers into Marathon app specs and wraps the handful
//! of Marathon endpoints the lifecycle needs.
//!
//! # Architecture
//!
//! ```text
//! SchedulerClient (trait, async)
//!   └── MarathonClient (reqwest)
//!       ├── POST/PUT /v2/apps           submit / update
//!       ├── GET      /v2/apps/{id}      exists
//!       ├── GET      /v2/apps/{id}/tasks + /v2/info   list_tasks
//!       ├── POST     /v2/apps/{id}/restart
//!       └── DELETE   /v2/apps/{id}
//! build_app_spec(Controller) → AppSpec   (pure)
//! ```

pub mod app;
pub mod client;
pub mod error;
pub mod task;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use app::{build_app_spec, AppSpec};
pub use client::{MarathonClient, SchedulerClient};
pub use error::{SchedulerError, SchedulerResult};
pub use task::Task;
