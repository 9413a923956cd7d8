//! Handlebars rendering for nginx and supervisor artifacts.
//!
//! Templates are compiled into the binary and registered once. Strict
//! mode is on, so a template referencing a parameter the caller didn't
//! supply fails to render instead of producing a half-empty config.

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::{ConfigError, ConfigResult};

/// The four artifact templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    FrontendNginx,
    CmsNginx,
    FrontendSupervisor,
    CmsSupervisor,
}

impl Template {
    pub const ALL: [Template; 4] = [
        Template::FrontendNginx,
        Template::CmsNginx,
        Template::FrontendSupervisor,
        Template::CmsSupervisor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Template::FrontendNginx => "frontend.nginx.conf",
            Template::CmsNginx => "cms.nginx.conf",
            Template::FrontendSupervisor => "frontend.supervisor.conf",
            Template::CmsSupervisor => "cms.supervisor.conf",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Template::FrontendNginx => include_str!("../templates/frontend.nginx.conf.hbs"),
            Template::CmsNginx => include_str!("../templates/cms.nginx.conf.hbs"),
            Template::FrontendSupervisor => {
                include_str!("../templates/frontend.supervisor.conf.hbs")
            }
            Template::CmsSupervisor => include_str!("../templates/cms.supervisor.conf.hbs"),
        }
    }
}

/// Parameters every template may reference.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateParams {
    pub deploy_environment: String,
    pub app_type: String,
    pub country: String,
    pub deploy_name: String,
    pub socket_path: String,
    pub settings_path: String,
    /// Serialized as `null` when absent so strict mode still sees the key.
    pub custom_domain: Option<String>,
}

pub struct ConfigRenderer {
    registry: Handlebars<'static>,
}

impl ConfigRenderer {
    pub fn new() -> ConfigResult<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        // Config files, not HTML.
        registry.register_escape_fn(handlebars::no_escape);

        for template in Template::ALL {
            registry
                .register_template_string(template.name(), template.source())
                .map_err(|e| ConfigError::Render(format!("{}: {e}", template.name())))?;
        }

        Ok(Self { registry })
    }

    pub fn render(&self, template: Template, params: &TemplateParams) -> ConfigResult<String> {
        self.registry
            .render(template.name(), params)
            .map_err(|e| ConfigError::Render(format!("{}: {e}", template.name())))
    }
}
