//! Per-deployment config artifacts.
//!
//! `ConfigManager` renders nginx and supervisor configs for one
//! `(app_type, country)` target and hands them to the versioned
//! workspace. Without a workspace every operation is a no-op that
//! reports [`WriteOutcome::Skipped`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ConfigResult;
use crate::layout::{self, ArtifactKind, LAYOUT_DIRS};
use crate::render::{ConfigRenderer, Template, TemplateParams};
use crate::workspace::{VersionedWorkspace, WriteOutcome};

pub struct ConfigManager {
    deploy_environment: String,
    renderer: ConfigRenderer,
    workspace: Option<Arc<VersionedWorkspace>>,
}

impl ConfigManager {
    /// Build a manager, creating the layout directories in the workspace.
    pub async fn new(
        deploy_environment: impl Into<String>,
        workspace: Option<Arc<VersionedWorkspace>>,
    ) -> ConfigResult<Self> {
        if let Some(ws) = &workspace {
            for dir in LAYOUT_DIRS {
                tokio::fs::create_dir_all(ws.working_dir().join(dir)).await?;
            }
        } else {
            warn!("no config workspace configured, config writes are disabled");
        }

        Ok(Self {
            deploy_environment: deploy_environment.into(),
            renderer: ConfigRenderer::new()?,
            workspace,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.workspace.is_some()
    }

    pub fn workspace(&self) -> Option<&VersionedWorkspace> {
        self.workspace.as_deref()
    }

    /// Absolute path of the frontend nginx config, when a workspace exists.
    pub fn frontend_nginx_path(&self, app_type: &str, country: &str) -> Option<PathBuf> {
        self.absolute(layout::nginx_path(
            ArtifactKind::Frontend,
            &layout::deploy_name(app_type, country),
        ))
    }

    pub fn cms_nginx_path(&self, app_type: &str, country: &str) -> Option<PathBuf> {
        self.absolute(layout::nginx_path(
            ArtifactKind::Cms,
            &layout::deploy_name(app_type, country),
        ))
    }

    pub async fn write_frontend_config(
        &self,
        app_type: &str,
        country: &str,
        custom_domain: Option<&str>,
    ) -> ConfigResult<WriteOutcome> {
        self.write(
            Template::FrontendNginx,
            ArtifactKind::Frontend,
            app_type,
            country,
            custom_domain,
        )
        .await
    }

    pub async fn write_cms_config(&self, app_type: &str, country: &str) -> ConfigResult<WriteOutcome> {
        self.write(Template::CmsNginx, ArtifactKind::Cms, app_type, country, None)
            .await
    }

    pub async fn write_supervisor_config(
        &self,
        kind: ArtifactKind,
        app_type: &str,
        country: &str,
    ) -> ConfigResult<WriteOutcome> {
        let template = match kind {
            ArtifactKind::Frontend => Template::FrontendSupervisor,
            ArtifactKind::Cms => Template::CmsSupervisor,
        };
        self.write(template, kind, app_type, country, None).await
    }

    /// Remove every artifact of a target, one commit per file.
    ///
    /// Not transactional: an error leaves earlier removals committed.
    pub async fn destroy(&self, app_type: &str, country: &str) -> ConfigResult<WriteOutcome> {
        layout::validate_target(app_type, country)?;
        let Some(ws) = &self.workspace else {
            return Ok(WriteOutcome::Skipped);
        };

        let deploy = layout::deploy_name(app_type, country);
        let mut outcome = WriteOutcome::Unchanged;
        for kind in [ArtifactKind::Frontend, ArtifactKind::Cms] {
            for (path, what) in [
                (layout::nginx_path(kind, &deploy), "nginx"),
                (layout::supervisor_path(kind, &deploy), "supervisor"),
            ] {
                let message = format!("Remove {} {what} config", kind.as_str());
                if ws.remove(&path, &message).await? == WriteOutcome::Committed {
                    outcome = WriteOutcome::Committed;
                }
            }
        }

        info!(deploy = %deploy, ?outcome, "destroyed config artifacts");
        Ok(outcome)
    }

    async fn write(
        &self,
        template: Template,
        kind: ArtifactKind,
        app_type: &str,
        country: &str,
        custom_domain: Option<&str>,
    ) -> ConfigResult<WriteOutcome> {
        layout::validate_target(app_type, country)?;
        if let Some(domain) = custom_domain {
            layout::validate_domains("custom_domain", domain)?;
        }
        let Some(ws) = &self.workspace else {
            return Ok(WriteOutcome::Skipped);
        };

        let deploy = layout::deploy_name(app_type, country);
        let root = ws.working_dir();
        let params = TemplateParams {
            deploy_environment: self.deploy_environment.clone(),
            app_type: app_type.to_lowercase(),
            country: country.to_lowercase(),
            deploy_name: deploy.clone(),
            socket_path: root
                .join(layout::socket_path(kind, &deploy))
                .display()
                .to_string(),
            settings_path: root
                .join(layout::settings_path(&deploy))
                .display()
                .to_string(),
            custom_domain: custom_domain
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string),
        };
        let content = self.renderer.render(template, &params)?;

        let (path, what) = match template {
            Template::FrontendNginx | Template::CmsNginx => (layout::nginx_path(kind, &deploy), "nginx"),
            Template::FrontendSupervisor | Template::CmsSupervisor => {
                (layout::supervisor_path(kind, &deploy), "supervisor")
            }
        };
        let message = format!("Save {} {what} config", kind.as_str());

        let outcome = ws.store_data(&path, &content, &message).await?;
        info!(deploy = %deploy, path = %path.display(), ?outcome, "wrote config artifact");
        Ok(outcome)
    }

    fn absolute(&self, rel: PathBuf) -> Option<PathBuf> {
        self.workspace.as_ref().map(|ws| ws.working_dir().join(rel))
    }
}
