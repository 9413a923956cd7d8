//! Git-versioned working directory for config artifacts.
//!
//! Every write lands as its own commit so the history of a deployment's
//! configs is auditable. Writers are serialized on one async mutex; git
//! itself is driven through `tokio::process` with a per-command timeout.
//!
//! ```text
//! store_data(path, content, message)
//!   ├── lock workspace
//!   ├── unchanged & clean? → Unchanged
//!   ├── write <path>.mc2-tmp, rename over <path>
//!   ├── git add -- <path>
//!   ├── git commit -m <message> -- <path>
//!   └── on error: restore previous content, git reset -- <path>
//! ```

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mc2_core::WorkspaceConfig;

use crate::error::{ConfigError, ConfigResult};

/// Identity and limits for git commands.
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    pub author_name: String,
    pub author_email: String,
    pub command_timeout: Duration,
}

impl From<&WorkspaceConfig> for WorkspaceSettings {
    fn from(config: &WorkspaceConfig) -> Self {
        Self {
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            command_timeout: config.command_timeout(),
        }
    }
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self::from(&WorkspaceConfig::default())
    }
}

/// What a write or removal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A commit was recorded.
    Committed,
    /// Content already matched; no commit.
    Unchanged,
    /// No workspace configured; nothing touched.
    Skipped,
}

pub struct VersionedWorkspace {
    root: PathBuf,
    settings: WorkspaceSettings,
    lock: Mutex<()>,
}

impl VersionedWorkspace {
    /// Open `root`, creating it and running `git init` when needed.
    pub async fn open(root: &Path, settings: WorkspaceSettings) -> ConfigResult<Self> {
        tokio::fs::create_dir_all(root).await?;
        let workspace = Self {
            root: root.to_path_buf(),
            settings,
            lock: Mutex::new(()),
        };

        if !tokio::fs::try_exists(root.join(".git")).await? {
            workspace.git(&["init", "-q"]).await?;
            info!(path = %root.display(), "initialised config workspace");
        }

        Ok(workspace)
    }

    pub fn working_dir(&self) -> &Path {
        &self.root
    }

    /// Write `content` to `path` and commit it with `message`.
    pub async fn store_data(
        &self,
        path: &Path,
        content: &str,
        message: &str,
    ) -> ConfigResult<WriteOutcome> {
        let rel = self.relative(path)?;
        let rel_str = rel.to_string_lossy().into_owned();
        let abs = self.root.join(&rel);

        let _guard = self.lock.lock().await;

        let previous = read_optional(&abs).await?;
        if previous.as_deref() == Some(content) && self.is_clean(&rel_str).await? {
            debug!(path = %rel_str, "config unchanged, skipping commit");
            return Ok(WriteOutcome::Unchanged);
        }

        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&abs, content).await?;

        match self.commit_path(&rel_str, message).await {
            Ok(outcome) => {
                debug!(path = %rel_str, ?outcome, "stored config");
                Ok(outcome)
            }
            Err(e) => {
                self.rollback(&rel_str, &abs, previous.as_deref()).await;
                Err(e)
            }
        }
    }

    /// Delete `path` and commit the removal. Missing files are a no-op.
    pub async fn remove(&self, path: &Path, message: &str) -> ConfigResult<WriteOutcome> {
        let rel = self.relative(path)?;
        let rel_str = rel.to_string_lossy().into_owned();
        let abs = self.root.join(&rel);

        let _guard = self.lock.lock().await;

        let Some(previous) = read_optional(&abs).await? else {
            return Ok(WriteOutcome::Unchanged);
        };

        let tracked = !self.git(&["ls-files", "--", &rel_str]).await?.trim().is_empty();
        tokio::fs::remove_file(&abs).await?;
        if !tracked {
            return Ok(WriteOutcome::Unchanged);
        }

        match self.commit_path(&rel_str, message).await {
            Ok(outcome) => {
                debug!(path = %rel_str, "removed config");
                Ok(outcome)
            }
            Err(e) => {
                self.rollback(&rel_str, &abs, Some(&previous)).await;
                Err(e)
            }
        }
    }

    /// Current content of `path`, if present.
    pub async fn read(&self, path: &Path) -> ConfigResult<Option<String>> {
        let rel = self.relative(path)?;
        read_optional(&self.root.join(rel)).await
    }

    /// Commit subjects touching `path`, newest first.
    pub async fn history(&self, path: &Path) -> ConfigResult<Vec<String>> {
        let rel = self.relative(path)?;
        let rel_str = rel.to_string_lossy().into_owned();
        if self.git(&["rev-parse", "--verify", "-q", "HEAD"]).await.is_err() {
            return Ok(Vec::new());
        }
        let log = self.git(&["log", "--format=%s", "--", &rel_str]).await?;
        Ok(log.lines().map(str::to_string).collect())
    }

    async fn commit_path(&self, rel: &str, message: &str) -> ConfigResult<WriteOutcome> {
        self.git(&["add", "-A", "--", rel]).await?;
        if self.is_clean(rel).await? {
            return Ok(WriteOutcome::Unchanged);
        }
        self.git(&["commit", "-q", "-m", message, "--", rel]).await?;
        Ok(WriteOutcome::Committed)
    }

    async fn is_clean(&self, rel: &str) -> ConfigResult<bool> {
        let status = self.git(&["status", "--porcelain", "--", rel]).await?;
        Ok(status.trim().is_empty())
    }

    async fn rollback(&self, rel: &str, abs: &Path, previous: Option<&str>) {
        let restored = match previous {
            Some(content) => write_atomic(abs, content).await,
            None => match tokio::fs::remove_file(abs).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
        };
        if let Err(e) = restored {
            warn!(path = %rel, error = %e, "failed to restore config after error");
        }
        if let Err(e) = self.git(&["reset", "-q", "--", rel]).await {
            warn!(path = %rel, error = %e, "failed to unstage config after error");
        }
    }

    /// Workspace-relative form of `path`. Absolute paths must sit under the root.
    fn relative(&self, path: &Path) -> ConfigResult<PathBuf> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .map_err(|_| ConfigError::PathEscape(path.display().to_string()))?
        } else {
            path
        };

        let mut clean = PathBuf::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                _ => return Err(ConfigError::PathEscape(path.display().to_string())),
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(ConfigError::PathEscape(path.display().to_string()));
        }
        Ok(clean)
    }

    /// Run one git command in the workspace and return its stdout.
    async fn git(&self, args: &[&str]) -> ConfigResult<String> {
        let name = format!("user.name={}", self.settings.author_name);
        let email = format!("user.email={}", self.settings.author_email);

        let mut cmd = Command::new("git");
        cmd.args(["-c", &name, "-c", &email, "-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let command = args.first().copied().unwrap_or_default().to_string();
        let output = tokio::time::timeout(self.settings.command_timeout, cmd.output())
            .await
            .map_err(|_| ConfigError::Timeout(self.settings.command_timeout.as_secs()))?
            .map_err(|e| ConfigError::Git {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ConfigError::Git {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

async fn read_optional(path: &Path) -> ConfigResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_atomic(path: &Path, content: &str) -> ConfigResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".mc2-tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
