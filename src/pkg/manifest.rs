// src/pkg/manifest.rs
//! Package manifest (`package.toml`) composition and parsing
//!
//! The manifest is written by hand rather than through a serializer: its
//! exact bytes are the first entry of the checksum ledger, so the layout
//! is fixed here and never depends on serializer defaults.

use crate::error::{Error, Result};
use crate::pkg::archive::MANIFEST_MEMBER;
use crate::pkg::profile::Profile;
use crate::pkg::value::{emit_table, encode_string, encode_value, ConfigTable, ConfigValue};
use serde::{Deserialize, Serialize};

/// Package format generation written into every manifest
pub const FORMAT_VERSION: &str = "1.0";

/// Module/symbol the runtime loads; opaque to packaging
pub const DEFAULT_ENTRYPOINT: &str = "agent.py:Agent";

/// Root key the embedded agent configuration is emitted under
pub const AGENT_CONFIG_KEY: &str = "agent_config";

/// `[metadata]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub package_format_version: String,
    #[serde(default)]
    pub created_at: String,
}

/// `[runtime]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            entrypoint: default_entrypoint(),
        }
    }
}

fn default_entrypoint() -> String {
    DEFAULT_ENTRYPOINT.to_string()
}

/// `[artifacts]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    /// Archive member holding the dependency requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
}

/// `[compose]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeSection {
    /// Archive member holding the deployment overlay
    pub file: String,
    #[serde(default)]
    pub services: Vec<String>,
}

/// Parsed or composed package manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageManifest {
    pub metadata: Metadata,
    pub runtime: Runtime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose: Option<ComposeSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<ConfigTable>,
}

/// Everything except `agent_config`, which is converted separately so its
/// key order survives
#[derive(Deserialize)]
struct ManifestDoc {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    runtime: Runtime,
    #[serde(default)]
    artifacts: Option<Artifacts>,
    #[serde(default)]
    compose: Option<ComposeSection>,
}

impl PackageManifest {
    /// Compose a manifest for a new package
    pub fn new(name: &str, version: &str, description: &str, created_at: &str) -> Self {
        Self {
            metadata: Metadata {
                name: name.to_string(),
                version: version.to_string(),
                description: description.to_string(),
                package_format_version: FORMAT_VERSION.to_string(),
                created_at: created_at.to_string(),
            },
            runtime: Runtime::default(),
            artifacts: None,
            compose: None,
            agent_config: None,
        }
    }

    /// Embed an agent configuration tree; empty trees are not embedded
    pub fn with_agent_config(mut self, config: Option<ConfigTable>) -> Self {
        self.agent_config = config.filter(|c| !c.is_empty());
        self
    }

    /// Parse `package.toml` text
    ///
    /// Does not require `metadata.name`; call [`validate`](Self::validate)
    /// where a name is needed.
    pub fn parse(text: &str) -> Result<Self> {
        let mut doc: toml::Table = toml::from_str(text).map_err(|e| Error::Parse {
            member: MANIFEST_MEMBER.to_string(),
            message: e.to_string(),
        })?;

        let agent_config = match doc.remove(AGENT_CONFIG_KEY) {
            Some(toml::Value::Table(t)) => Some(ConfigTable::from_toml(t)),
            Some(_) => {
                return Err(Error::Parse {
                    member: MANIFEST_MEMBER.to_string(),
                    message: format!("{} must be a table", AGENT_CONFIG_KEY),
                });
            }
            None => None,
        };

        let parsed: ManifestDoc = toml::Value::Table(doc).try_into().map_err(|e: toml::de::Error| {
            Error::Parse {
                member: MANIFEST_MEMBER.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            metadata: parsed.metadata,
            runtime: parsed.runtime,
            artifacts: parsed.artifacts,
            compose: parsed.compose,
            agent_config,
        })
    }

    /// Require the fields an install target is derived from
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.trim().is_empty() {
            return Err(Error::MissingField("metadata.name".to_string()));
        }
        validate_name(&self.metadata.name)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Render the manifest document
    ///
    /// Section order: metadata, runtime, artifacts, compose, agent_config.
    /// Each section is separated by one blank line and the document ends
    /// with a newline.
    pub fn to_toml(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        let meta = &self.metadata;
        sections.push(
            [
                "[metadata]".to_string(),
                format!("name = {}", encode_string(&meta.name)),
                format!("version = {}", encode_string(&meta.version)),
                format!("description = {}", encode_string(&meta.description)),
                format!(
                    "package_format_version = {}",
                    encode_string(&meta.package_format_version)
                ),
                format!("created_at = {}", encode_string(&meta.created_at)),
            ]
            .join("\n"),
        );

        sections.push(format!(
            "[runtime]\nentrypoint = {}",
            encode_string(&self.runtime.entrypoint)
        ));

        if let Some(artifacts) = &self.artifacts {
            let mut lines = vec!["[artifacts]".to_string()];
            if let Some(profile) = artifacts.profile {
                lines.push(format!("profile = {}", encode_string(profile.as_str())));
            }
            if let Some(requirements) = &artifacts.requirements {
                lines.push(format!("requirements = {}", encode_string(requirements)));
            }
            sections.push(lines.join("\n"));
        }

        if let Some(compose) = &self.compose {
            let services = ConfigValue::List(
                compose.services.iter().map(ConfigValue::string).collect(),
            );
            sections.push(format!(
                "[compose]\nfile = {}\nservices = {}",
                encode_string(&compose.file),
                encode_value(&services)
            ));
        }

        if let Some(config) = &self.agent_config {
            sections.push(emit_table(AGENT_CONFIG_KEY, config).trim_end().to_string());
        }

        let mut out = sections.join("\n\n");
        out.push('\n');
        out
    }
}

/// Package names become directory names under `agents/`
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name != name.trim()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Versions become part of the output file name `<name>-<version>.l6e`
pub fn validate_version(version: &str) -> Result<()> {
    let invalid = version.is_empty()
        || version != version.trim()
        || version.contains("..")
        || version.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidVersion(version.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("demo").is_ok());
        assert!(validate_name("my-agent_2").is_ok());
        for bad in ["", ".", "..", "a/b", "..\\x", " demo"] {
            assert!(matches!(validate_name(bad), Err(Error::InvalidName(_))), "{bad:?}");
        }

        let parsed = PackageManifest::parse("[metadata]\nname = \"../etc\"\n").unwrap();
        assert!(matches!(parsed.validate(), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_validate_version() {
        for ok in ["0.1.0", "1.0.0-rc.1+build.5", "2024.06"] {
            assert!(validate_version(ok).is_ok(), "{ok:?}");
        }
        for bad in ["", " 1.0", "x/../../escaped", "1\\2", "..", "1.0\0"] {
            assert!(matches!(validate_version(bad), Err(Error::InvalidVersion(_))), "{bad:?}");
        }
    }

    fn sample() -> PackageManifest {
        PackageManifest::new("demo", "0.2.0", "Demo agent", "2024-01-01T00:00:00Z")
    }

    #[test]
    fn test_minimal_manifest_layout() {
        let text = sample().to_toml();
        assert_eq!(
            text,
            "[metadata]\n\
             name = \"demo\"\n\
             version = \"0.2.0\"\n\
             description = \"Demo agent\"\n\
             package_format_version = \"1.0\"\n\
             created_at = \"2024-01-01T00:00:00Z\"\n\
             \n\
             [runtime]\n\
             entrypoint = \"agent.py:Agent\"\n"
        );
    }

    #[test]
    fn test_roundtrip_with_all_sections() {
        let config = ConfigTable::parse(
            "[agent]\ndescription = \"Config Desc\"\n[model]\nprovider = \"ollama\"\n",
        )
        .unwrap();
        let mut manifest = sample().with_agent_config(Some(config));
        manifest.artifacts = Some(Artifacts {
            profile: Some(Profile::Fat),
            requirements: Some("artifacts/requirements.txt".to_string()),
        });
        manifest.compose = Some(ComposeSection {
            file: "compose/stack.yaml".to_string(),
            services: vec!["monitor".to_string(), "ollama".to_string()],
        });

        let text = manifest.to_toml();
        let parsed = PackageManifest::parse(&text).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.to_toml(), text);
        assert!(text.contains("services = [\"monitor\", \"ollama\"]"));
        assert!(text.contains("profile = \"fat\""));
    }

    #[test]
    fn test_metadata_strings_are_escaped() {
        let manifest = PackageManifest::new("demo", "1.0", "says \"hi\"\\", "t");
        let parsed = PackageManifest::parse(&manifest.to_toml()).unwrap();
        assert_eq!(parsed.metadata.description, "says \"hi\"\\");
    }

    #[test]
    fn test_empty_agent_config_not_embedded() {
        let manifest = sample().with_agent_config(Some(ConfigTable::new()));
        assert!(manifest.agent_config.is_none());
        assert!(!manifest.to_toml().contains("agent_config"));
    }

    #[test]
    fn test_validate_requires_name() {
        let parsed = PackageManifest::parse("[metadata]\nversion = \"1.0\"\n").unwrap();
        let err = parsed.validate().unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_parse_missing_sections_defaults() {
        let parsed = PackageManifest::parse("").unwrap();
        assert_eq!(parsed.metadata.name, "");
        assert_eq!(parsed.runtime.entrypoint, DEFAULT_ENTRYPOINT);
        assert!(parsed.agent_config.is_none());
    }

    #[test]
    fn test_parse_error_names_member() {
        let err = PackageManifest::parse("[metadata\nname = ").unwrap_err();
        assert!(err.to_string().contains("package.toml"));

        let err = PackageManifest::parse("agent_config = 3\n").unwrap_err();
        assert!(err.to_string().contains("agent_config"));
    }
}
