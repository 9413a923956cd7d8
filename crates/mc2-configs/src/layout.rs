//! Where config artifacts live inside the workspace.
//!
//! Every path here is relative to the workspace root and derived only
//! from the deploy name, so the same target always maps to the same
//! files.

use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};

pub const NGINX_DIR: &str = "nginx";
pub const SUPERVISOR_DIR: &str = "supervisor";
pub const FRONTEND_SETTINGS_DIR: &str = "frontend_settings";
pub const FRONTEND_SOCKETS_DIR: &str = "frontend_sockets";
pub const CMS_SOCKETS_DIR: &str = "cms_sockets";

/// Directories created when a manager is constructed.
pub const LAYOUT_DIRS: [&str; 5] = [
    NGINX_DIR,
    SUPERVISOR_DIR,
    FRONTEND_SETTINGS_DIR,
    FRONTEND_SOCKETS_DIR,
    CMS_SOCKETS_DIR,
];

/// Which half of a deployment an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Frontend,
    Cms,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Frontend => "frontend",
            ArtifactKind::Cms => "cms",
        }
    }

    fn sockets_dir(self) -> &'static str {
        match self {
            ArtifactKind::Frontend => FRONTEND_SOCKETS_DIR,
            ArtifactKind::Cms => CMS_SOCKETS_DIR,
        }
    }
}

/// `lowercase(app_type) + "_" + lowercase(country)`.
pub fn deploy_name(app_type: &str, country: &str) -> String {
    format!("{}_{}", app_type.to_lowercase(), country.to_lowercase())
}

/// Reject targets whose deploy name would not be a safe file name.
pub fn validate_target(app_type: &str, country: &str) -> ConfigResult<()> {
    for (field, value) in [("app_type", app_type), ("country", country)] {
        if value.is_empty() {
            return Err(ConfigError::InvalidTarget(format!("{field} is empty")));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidTarget(format!(
                "{field} '{value}' may only contain ASCII letters, digits, '-' and '_'"
            )));
        }
    }
    Ok(())
}

/// Reject domain lists that aren't plain host names separated by single
/// spaces. The value ends up verbatim in nginx `server_name`.
pub fn validate_domains(field: &str, value: &str) -> ConfigResult<()> {
    for token in value.split(' ').filter(|t| !t.is_empty()) {
        let host_chars = token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !host_chars || token.starts_with(['.', '-']) {
            return Err(ConfigError::InvalidTarget(format!(
                "{field} '{}' is not a host name",
                token.escape_debug()
            )));
        }
    }
    Ok(())
}

pub fn nginx_path(kind: ArtifactKind, deploy: &str) -> PathBuf {
    PathBuf::from(NGINX_DIR).join(format!("{}_{deploy}.conf", kind.as_str()))
}

pub fn supervisor_path(kind: ArtifactKind, deploy: &str) -> PathBuf {
    PathBuf::from(SUPERVISOR_DIR).join(format!("{}_{deploy}.conf", kind.as_str()))
}

pub fn socket_path(kind: ArtifactKind, deploy: &str) -> PathBuf {
    PathBuf::from(kind.sockets_dir()).join(format!("{deploy}.socket"))
}

pub fn settings_path(deploy: &str) -> PathBuf {
    PathBuf::from(FRONTEND_SETTINGS_DIR).join(format!("{deploy}.ini"))
}
