//! mc2-state — controller records and their lifecycle edge table.
//!
//! Backed by [redb](https://docs.rs/redb). Controllers are stored as JSON
//! keyed by id; a second table reserves app ids so the scheduler-facing
//! identifier stays globally unique.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod transitions;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use transitions::{ControllerState, InvalidTransition, LifecycleAction};
pub use types::*;
