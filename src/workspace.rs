// src/workspace.rs

//! Workspace detection and `forge.toml` configuration
//!
//! A workspace is a directory holding the `forge.toml` marker file and an
//! `agents/` directory. Installs write into `agents/<name>/`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Marker config file at the workspace root
pub const WORKSPACE_FILE: &str = "forge.toml";

/// Directory installed agents live in
pub const AGENTS_DIR: &str = "agents";

/// Workspace configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub workspace: WorkspaceSection,

    #[serde(default)]
    pub packaging: PackagingConfig,
}

/// `[workspace]` section, informational only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSection {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,
}

/// `[packaging]` section: install-time verification defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Verify checksums on install
    #[serde(default = "default_true")]
    pub verify: bool,

    /// Verify signatures on install
    #[serde(default)]
    pub verify_signatures: bool,

    /// Trusted public key, relative to the workspace root
    #[serde(default)]
    pub public_key: Option<PathBuf>,

    /// Reject packages that carry no checksum ledger
    #[serde(default)]
    pub require_checksums: bool,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            verify: true,
            verify_signatures: false,
            public_key: None,
            require_checksums: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl WorkspaceConfig {
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// An existing workspace on disk
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
}

impl Workspace {
    /// Open a workspace, failing with the first missing marker
    pub fn open(root: &Path) -> Result<Self> {
        let marker = root.join(WORKSPACE_FILE);
        if !marker.is_file() {
            return Err(Error::NotAWorkspace {
                root: root.to_path_buf(),
                missing: WORKSPACE_FILE.to_string(),
            });
        }
        if !root.join(AGENTS_DIR).is_dir() {
            return Err(Error::NotAWorkspace {
                root: root.to_path_buf(),
                missing: format!("{}/", AGENTS_DIR),
            });
        }

        let content = fs::read_to_string(&marker).map_err(|e| Error::io(&marker, e))?;
        let config = WorkspaceConfig::parse(&content).map_err(|e| Error::Parse {
            member: marker.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Create the marker file and `agents/` if missing
    ///
    /// Used by tests and tooling; an existing `forge.toml` is left as is.
    pub fn init(root: &Path, name: &str) -> Result<Self> {
        let agents = root.join(AGENTS_DIR);
        fs::create_dir_all(&agents).map_err(|e| Error::io(&agents, e))?;

        let marker = root.join(WORKSPACE_FILE);
        if !marker.exists() {
            let content = format!(
                "[workspace]\nname = {}\nversion = \"0.1.0\"\n",
                crate::pkg::value::encode_string(name)
            );
            fs::write(&marker, content).map_err(|e| Error::io(&marker, e))?;
        }

        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join(AGENTS_DIR)
    }

    pub fn agent_dir(&self, name: &str) -> PathBuf {
        self.agents_dir().join(name)
    }

    /// Configured public key resolved against the workspace root
    pub fn public_key_path(&self) -> Option<PathBuf> {
        self.config
            .packaging
            .public_key
            .as_ref()
            .map(|p| self.root.join(p))
    }
}
