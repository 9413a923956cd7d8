//! mc2-core — shared configuration for the mc2 crates.
//!
//! [`Mc2Config`] is parsed once from `mc2.toml` by the daemon; each
//! component receives only its own section.

pub mod config;

pub use config::{
    DeployConfig, LogDriverConfig, MarathonConfig, Mc2Config, ReconcileConfig, ServerConfig,
    WorkspaceConfig,
};
