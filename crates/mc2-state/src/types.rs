//! Domain types for the controller store.
//!
//! A `Controller` is the persisted desired-state record for one
//! deployable application. Its `state` field is private: it only changes
//! through [`Controller::apply`], which enforces the edge table in
//! [`crate::transitions`].

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transitions::{ControllerState, InvalidTransition, LifecycleAction};

/// Unique identifier for a controller (UUIDv4 string).
pub type ControllerId = String;

/// Longest slug kept from a controller name when deriving its app id.
const MAX_SLUG_LEN: usize = 40;

/// What the user asked to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ControllerSpec {
    /// Command run inside the container (or on the agent without one).
    pub cmd: Option<String>,
    /// CPU shares; scheduler default when unset.
    pub cpus: Option<f64>,
    /// Memory in MB; scheduler default when unset.
    pub mem: Option<f64>,
    pub instances: Option<u32>,
    /// Docker image reference.
    pub image: Option<String>,
    /// Container port to expose.
    pub port: Option<u16>,
    /// HTTP path probed by the scheduler's health check.
    pub health_check_path: Option<String>,
    /// Extra domain aliases, space-delimited.
    #[serde(default)]
    pub domain_urls: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Extra scheduler labels. `domain` is always overwritten.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Keys generated nginx / supervisor configs, when present.
    pub deployment: Option<DeploymentTarget>,
}

/// `(app_type, country)` pair that generated config artifacts hang off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub app_type: String,
    pub country: String,
    pub custom_domain: Option<String>,
}

/// Input for a new controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewController {
    pub name: String,
    pub organization_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub spec: ControllerSpec,
}

/// A persisted controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Controller {
    pub id: ControllerId,
    pub name: String,
    /// Scheduler app id and DNS label. Immutable.
    pub app_id: String,
    pub organization_id: String,
    pub owner_id: String,
    pub spec: ControllerSpec,
    state: ControllerState,
    /// Last creation failure, for operators.
    pub last_error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A successful state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ControllerState,
    pub action: LifecycleAction,
    pub to: ControllerState,
}

/// Flat view of a controller for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerSummary {
    pub id: ControllerId,
    pub name: String,
    pub app_id: String,
    pub state: ControllerState,
    pub state_display: String,
    pub cmd: Option<String>,
    pub port: Option<u16>,
    pub health_check_path: Option<String>,
    pub last_error: Option<String>,
}

impl Controller {
    /// Build a fresh controller in state `initial` with a new id.
    pub fn new(new: NewController) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), new)
    }

    /// Build a controller with a caller-chosen id (tests, imports).
    pub fn with_id(id: impl Into<ControllerId>, new: NewController) -> Self {
        let id = id.into();
        let now = epoch_secs();
        Self {
            app_id: derive_app_id(&new.name, &id),
            id,
            name: new.name,
            organization_id: new.organization_id,
            owner_id: new.owner_id,
            spec: new.spec,
            state: ControllerState::Initial,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Move along one edge of the lifecycle.
    pub fn apply(&mut self, action: LifecycleAction) -> Result<Transition, InvalidTransition> {
        let from = self.state;
        let to = from.next(action)?;
        self.state = to;
        self.updated_at = epoch_secs();
        Ok(Transition { from, action, to })
    }

    /// Replace the desired spec. Never touches `state` or `app_id`.
    pub fn update_spec(&mut self, spec: ControllerSpec) {
        self.spec = spec;
        self.updated_at = epoch_secs();
    }

    pub fn summary(&self) -> ControllerSummary {
        ControllerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            app_id: self.app_id.clone(),
            state: self.state,
            state_display: self.state.display_name().to_string(),
            cmd: self.spec.cmd.clone(),
            port: self.spec.port,
            health_check_path: self.spec.health_check_path.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// `slug(name)-<first 8 hex chars of id>`.
pub fn derive_app_id(name: &str, id: &str) -> String {
    let suffix: String = id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .take(8)
        .collect();
    let slug = slugify(name);
    if suffix.is_empty() {
        slug
    } else {
        format!("{slug}-{suffix}")
    }
}

/// Lowercase ASCII slug: runs of anything outside `[a-z0-9]` collapse to
/// one `-`, no leading or trailing `-`, empty input becomes `app`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "app".to_string()
    } else {
        slug.to_string()
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
