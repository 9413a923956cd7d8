//! mc2-configs — nginx and supervisor artifacts for deployment targets.
//!
//! # Components
//!
//! - **`layout`** — deploy names and deterministic artifact paths
//! - **`render`** — handlebars templates, strict mode
//! - **`workspace`** — git-versioned working directory, one commit per write
//! - **`manager`** — `ConfigManager`, the write/destroy operations the
//!   lifecycle calls

pub mod error;
pub mod layout;
pub mod manager;
pub mod render;
pub mod workspace;

pub use error::{ConfigError, ConfigResult};
pub use layout::{deploy_name, ArtifactKind};
pub use manager::ConfigManager;
pub use render::{ConfigRenderer, Template, TemplateParams};
pub use workspace::{VersionedWorkspace, WorkspaceSettings, WriteOutcome};
