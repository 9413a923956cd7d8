//! Authentication and authorization gate.
//!
//! mc2 sits behind a proxy that authenticates users and forwards who
//! they are in headers. Handlers take a [`Principal`] (authn, 401 when
//! absent) and call [`Principal::require`] (authz, 403) before touching
//! a controller; controllers of another organization read as 404.

use std::collections::BTreeSet;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};

use mc2_state::Controller;

use crate::response::ApiError;

pub const USER_HEADER: &str = "x-mc2-user";
pub const ORG_HEADER: &str = "x-mc2-org";
pub const PERMISSIONS_HEADER: &str = "x-mc2-permissions";
pub const SUPERUSER_HEADER: &str = "x-mc2-superuser";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    View,
    Add,
    Change,
    Delete,
}

impl Permission {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Some(Permission::View),
            "add" => Some(Permission::Add),
            "change" => Some(Permission::Change),
            "delete" => Some(Permission::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Add => "add",
            Permission::Change => "change",
            Permission::Delete => "delete",
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub organization_id: Option<String>,
    pub permissions: BTreeSet<Permission>,
    pub superuser: bool,
}

impl Principal {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_HEADER)
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "authentication required"))?
            .to_string();
        let permissions = header(PERMISSIONS_HEADER)
            .map(|v| v.split(',').filter_map(Permission::parse).collect())
            .unwrap_or_default();
        let superuser = header(SUPERUSER_HEADER)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            user_id,
            organization_id: header(ORG_HEADER).map(str::to_string),
            permissions,
            superuser,
        })
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.superuser || self.permissions.contains(&permission)
    }

    /// 403 unless the caller holds `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(ApiError::new(
                StatusCode::FORBIDDEN,
                format!("missing '{}' permission", permission.as_str()),
            ))
        }
    }

    /// Whether the caller may see this controller at all.
    pub fn can_see(&self, controller: &Controller) -> bool {
        match &self.organization_id {
            Some(org) => *org == controller.organization_id,
            None => self.superuser,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Principal::from_headers(&parts.headers)
    }
}
