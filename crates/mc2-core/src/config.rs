//! mc2.toml configuration parser.
//!
//! Every section has defaults so a minimal file (or an empty one) is a
//! valid configuration. The daemon loads this once at startup and hands
//! the relevant section to each component's constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Mc2Config {
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub marathon: MarathonConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub logdriver: LogDriverConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Deployment-wide naming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Environment name rendered into generated configs ("qa", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Base domain appended to every app id for routing.
    #[serde(default = "default_hub_domain")]
    pub hub_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarathonConfig {
    /// Base URL of the Marathon API, e.g. `http://marathon:8080`.
    #[serde(default = "default_marathon_host")]
    pub host: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Mesos agent work dir, used to locate task sandboxes.
    #[serde(default = "default_mesos_work_dir")]
    pub mesos_work_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Git-backed configs repository. Unset disables config persistence.
    pub configs_repo_path: Option<PathBuf>,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogDriverConfig {
    /// Internal location the reverse proxy serves task logs from.
    #[serde(default = "default_logdriver_path")]
    pub path: String,
    /// Default number of backlog lines requested.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,
}

fn default_environment() -> String {
    "qa".to_string()
}

fn default_hub_domain() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/mc2")
}

fn default_marathon_host() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_mesos_work_dir() -> String {
    "/tmp/mesos".to_string()
}

fn default_author_name() -> String {
    "mc2".to_string()
}

fn default_author_email() -> String {
    "mc2@localhost".to_string()
}

fn default_command_timeout() -> u64 {
    30
}

fn default_logdriver_path() -> String {
    "/logdriver/".to_string()
}

fn default_backlog() -> u32 {
    100
}

fn default_reconcile_interval() -> u64 {
    60
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            hub_domain: default_hub_domain(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for MarathonConfig {
    fn default() -> Self {
        Self {
            host: default_marathon_host(),
            timeout_secs: default_request_timeout(),
            username: None,
            password: None,
            mesos_work_dir: default_mesos_work_dir(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            configs_repo_path: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Default for LogDriverConfig {
    fn default() -> Self {
        Self {
            path: default_logdriver_path(),
            backlog: default_backlog(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval(),
        }
    }
}

impl MarathonConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl WorkspaceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Mc2Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Mc2Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.deploy.hub_domain.trim().is_empty() {
            anyhow::bail!("deploy.hub_domain must not be empty");
        }
        if !self.marathon.host.starts_with("http://") && !self.marathon.host.starts_with("https://") {
            anyhow::bail!("marathon.host must be an http(s) URL, got {}", self.marathon.host);
        }
        if self.marathon.timeout_secs == 0 {
            anyhow::bail!("marathon.timeout_secs must be positive");
        }
        if self.reconcile.interval_secs == 0 {
            anyhow::bail!("reconcile.interval_secs must be positive");
        }
        if self.marathon.username.is_some() != self.marathon.password.is_some() {
            anyhow::bail!("marathon.username and marathon.password must be set together");
        }
        Ok(())
    }
}
