// src/pkg/profile.rs
//! Packaging profiles and overlay service selection

use crate::error::{Error, Result};
use crate::pkg::value::ConfigTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Observability service every auto-selected overlay starts with
pub const DEFAULT_SERVICE: &str = "monitor";

/// Services the built-in overlay generator knows
pub const KNOWN_SERVICES: [&str; 6] = ["monitor", "api", "ui", "qdrant", "redis", "ollama"];

/// Requirements file looked up inside the agent directory
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Packaging tier controlling which optional artifacts are embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Manifest and source only
    Thin,
    /// Adds the deployment overlay
    Medium,
    /// Adds the overlay and dependency requirements
    Fat,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thin => "thin",
            Self::Medium => "medium",
            Self::Fat => "fat",
        }
    }

    pub fn includes_overlay(&self) -> bool {
        matches!(self, Self::Medium | Self::Fat)
    }

    pub fn requires_requirements(&self) -> bool {
        matches!(self, Self::Fat)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thin" => Ok(Self::Thin),
            "medium" => Ok(Self::Medium),
            "fat" => Ok(Self::Fat),
            _ => Err(Error::UnknownProfile(s.to_string())),
        }
    }
}

/// Requested overlay services
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServiceSelection {
    /// Infer from the agent's configuration
    #[default]
    Auto,
    Explicit(Vec<String>),
}

impl ServiceSelection {
    /// Parse a comma-separated list; `auto` or an empty string selects [`Auto`](Self::Auto)
    pub fn parse(list: &str) -> Self {
        let list = list.trim();
        if list.is_empty() || list.eq_ignore_ascii_case("auto") {
            return Self::Auto;
        }
        Self::Explicit(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Resolve to an ordered, deduplicated service list
    pub fn resolve(&self, config: Option<&ConfigTable>) -> Result<Vec<String>> {
        match self {
            Self::Auto => Ok(auto_services(config)),
            Self::Explicit(names) => {
                let mut services: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    let name = name.trim().to_ascii_lowercase();
                    if !KNOWN_SERVICES.contains(&name.as_str()) {
                        return Err(Error::UnknownService(name));
                    }
                    if !services.contains(&name) {
                        services.push(name);
                    }
                }
                Ok(services)
            }
        }
    }
}

impl FromStr for ServiceSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Infer overlay services from an agent configuration
///
/// `monitor` always comes first. A memory provider of `qdrant` or `redis`
/// adds that service; an `ollama` model provider adds `ollama`.
pub fn auto_services(config: Option<&ConfigTable>) -> Vec<String> {
    let mut services = vec![DEFAULT_SERVICE.to_string()];
    let Some(config) = config else {
        return services;
    };

    let memory = config
        .get_str(&["memory", "provider"])
        .or_else(|| config.get_str(&["memory", "backend"]))
        .map(str::to_ascii_lowercase);
    if let Some(memory) = memory {
        if memory == "qdrant" || memory == "redis" {
            services.push(memory);
        }
    }

    if config
        .get_str(&["model", "provider"])
        .is_some_and(|p| p.eq_ignore_ascii_case("ollama"))
    {
        services.push("ollama".to_string());
    }

    services
}

/// Optional artifacts chosen for one build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPlan {
    pub profile: Option<Profile>,
    /// Services for the overlay, when one is embedded
    pub services: Option<Vec<String>>,
    /// Requirements file to embed
    pub requirements: Option<PathBuf>,
}

impl ArtifactPlan {
    /// Whether the manifest gets an `[artifacts]` table
    pub fn records_artifacts(&self) -> bool {
        self.profile.is_some() || self.requirements.is_some()
    }
}

/// Decide which optional artifacts a build embeds
///
/// The overlay is embedded when `include_overlay` says so, or, when it is
/// unset, when the profile includes one. An explicit requirements path is
/// always embedded; otherwise `requirements.txt` in the agent directory is
/// used for profiles that need it.
pub fn plan_artifacts(
    agent_dir: &Path,
    profile: Option<Profile>,
    include_overlay: Option<bool>,
    selection: &ServiceSelection,
    requirements_path: Option<&Path>,
    config: Option<&ConfigTable>,
) -> Result<ArtifactPlan> {
    let overlay = include_overlay.unwrap_or_else(|| profile.is_some_and(|p| p.includes_overlay()));
    let services = if overlay {
        Some(selection.resolve(config)?)
    } else {
        None
    };

    let needs_requirements = profile.is_some_and(|p| p.requires_requirements());
    let requirements = match requirements_path {
        Some(path) => {
            if !path.is_file() {
                return Err(Error::MissingRequirements {
                    profile: profile.map_or("none", |p| p.as_str()).to_string(),
                    path: path.to_path_buf(),
                });
            }
            Some(path.to_path_buf())
        }
        None if needs_requirements => {
            let default = agent_dir.join(REQUIREMENTS_FILE);
            if !default.is_file() {
                return Err(Error::MissingRequirements {
                    profile: profile.map_or("none", |p| p.as_str()).to_string(),
                    path: default,
                });
            }
            Some(default)
        }
        None => None,
    };

    debug!(
        "Artifact plan: profile={:?} overlay={:?} requirements={:?}",
        profile, services, requirements
    );

    Ok(ArtifactPlan {
        profile,
        services,
        requirements,
    })
}
