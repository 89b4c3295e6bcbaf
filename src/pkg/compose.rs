// src/pkg/compose.rs
//! Deployment overlay generation
//!
//! Packaging treats the overlay as an opaque document: it asks a generator
//! for one given the resolved service names and embeds the bytes.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// Produces a deployment descriptor for a list of service names
pub trait OverlayGenerator {
    fn generate(&self, services: &[String]) -> Result<String>;
}

/// Image and port for one built-in service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTemplate {
    pub name: &'static str,
    pub image: &'static str,
    pub tag: &'static str,
    pub port: u16,
}

const TEMPLATES: [ServiceTemplate; 6] = [
    ServiceTemplate { name: "monitor", image: "l6e/monitor", tag: "latest", port: 8321 },
    ServiceTemplate { name: "api", image: "l6e/api", tag: "latest", port: 8000 },
    ServiceTemplate { name: "ui", image: "l6e/ui", tag: "latest", port: 3000 },
    ServiceTemplate { name: "qdrant", image: "qdrant/qdrant", tag: "latest", port: 6333 },
    ServiceTemplate { name: "redis", image: "redis", tag: "alpine", port: 6379 },
    ServiceTemplate { name: "ollama", image: "ollama/ollama", tag: "latest", port: 11434 },
];

/// Look up a built-in service template
pub fn template(name: &str) -> Option<&'static ServiceTemplate> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/// Compose-file generator backed by the built-in templates
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateOverlay;

impl TemplateOverlay {
    pub fn new() -> Self {
        Self
    }
}

/// Compose document; `services` keeps the requested order
#[derive(Debug, Serialize)]
struct ComposeFile {
    version: &'static str,
    services: Mapping,
}

#[derive(Debug, Serialize)]
struct ComposeService {
    image: String,
    ports: Vec<String>,
}

impl From<&ServiceTemplate> for ComposeService {
    fn from(t: &ServiceTemplate) -> Self {
        Self {
            image: format!("{}:{}", t.image, t.tag),
            ports: vec![format!("{port}:{port}", port = t.port)],
        }
    }
}

impl OverlayGenerator for TemplateOverlay {
    fn generate(&self, services: &[String]) -> Result<String> {
        let render_err = |e: serde_yaml::Error| Error::Overlay(e.to_string());

        let mut mapping = Mapping::new();
        for name in services {
            let t = template(name).ok_or_else(|| Error::UnknownService(name.clone()))?;
            let service = serde_yaml::to_value(ComposeService::from(t)).map_err(render_err)?;
            mapping.insert(Value::String(t.name.to_string()), service);
        }

        let file = ComposeFile {
            version: "3.8",
            services: mapping,
        };
        serde_yaml::to_string(&file).map_err(render_err)
    }
}
