//! Marathon app-spec construction.
//!
//! `build_app_spec` is a pure mapping from a controller to the JSON body
//! Marathon accepts. Field order is fixed by the struct layout, so equal
//! controllers always serialize to byte-identical JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mc2_state::Controller;

/// CPU shares when the controller doesn't set any.
pub const DEFAULT_CPUS: f64 = 0.1;
/// Memory in MB when the controller doesn't set any.
pub const DEFAULT_MEM_MB: f64 = 128.0;
pub const DEFAULT_INSTANCES: u32 = 1;

pub const HEALTH_GRACE_PERIOD_SECS: u32 = 3;
pub const HEALTH_INTERVAL_SECS: u32 = 10;
pub const HEALTH_TIMEOUT_SECS: u32 = 5;
pub const HEALTH_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Label the routing layer reads to learn which hostnames map to an app.
pub const DOMAIN_LABEL: &str = "domain";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    pub id: String,
    pub cpus: f64,
    pub mem: f64,
    pub instances: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<Vec<HealthCheck>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Container {
    #[serde(rename = "type")]
    pub kind: ContainerKind,
    pub docker: Docker,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerKind {
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Docker {
    pub image: String,
    pub force_pull_image: bool,
    pub network: NetworkMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_mappings: Option<Vec<PortMapping>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkMode {
    Bridge,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    /// 0 lets the scheduler pick the host port.
    pub host_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub grace_period_seconds: u32,
    pub interval_seconds: u32,
    pub max_consecutive_failures: u32,
    pub path: String,
    pub port_index: u32,
    pub protocol: String,
    pub timeout_seconds: u32,
}

impl HealthCheck {
    fn http(path: &str) -> Self {
        Self {
            grace_period_seconds: HEALTH_GRACE_PERIOD_SECS,
            interval_seconds: HEALTH_INTERVAL_SECS,
            max_consecutive_failures: HEALTH_MAX_CONSECUTIVE_FAILURES,
            path: path.to_string(),
            port_index: 0,
            protocol: "HTTP".to_string(),
            timeout_seconds: HEALTH_TIMEOUT_SECS,
        }
    }
}

impl AppSpec {
    pub fn to_json(&self) -> String {
        // Only strings, numbers and maps with string keys: cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// `"<app_id>.<hub_domain> alias1 alias2"`.
pub fn domain_label(app_id: &str, hub_domain: &str, extra: &str) -> String {
    std::iter::once(format!("{app_id}.{hub_domain}"))
        .chain(extra.split_whitespace().map(str::to_string))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a controller onto Marathon's app schema.
pub fn build_app_spec(controller: &Controller, hub_domain: &str) -> AppSpec {
    let spec = &controller.spec;

    let mut labels = spec.labels.clone();
    labels.insert(
        DOMAIN_LABEL.to_string(),
        domain_label(&controller.app_id, hub_domain, &spec.domain_urls),
    );

    let container = spec.image.as_ref().map(|image| Container {
        kind: ContainerKind::Docker,
        docker: Docker {
            image: image.clone(),
            force_pull_image: true,
            network: NetworkMode::Bridge,
            port_mappings: spec.port.map(|port| {
                vec![PortMapping {
                    container_port: port,
                    host_port: 0,
                }]
            }),
        },
    });

    let health_path = match (spec.port, spec.health_check_path.as_deref()) {
        (Some(_), Some(path)) if !path.is_empty() => Some(path),
        _ => None,
    };

    AppSpec {
        id: controller.app_id.clone(),
        cpus: spec.cpus.unwrap_or(DEFAULT_CPUS),
        mem: spec.mem.unwrap_or(DEFAULT_MEM_MB),
        instances: spec.instances.unwrap_or(DEFAULT_INSTANCES),
        cmd: spec.cmd.clone().filter(|c| !c.is_empty()),
        labels,
        env: spec.env.clone(),
        container,
        ports: health_path.map(|_| vec![0]),
        health_checks: health_path.map(|path| vec![HealthCheck::http(path)]),
    }
}
