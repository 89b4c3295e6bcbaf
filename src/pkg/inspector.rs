// src/pkg/inspector.rs
//! Read-only package inspection

use crate::error::{Error, Result};
use crate::pkg::archive::{
    for_each_member, PackageArchive, AGENT_PREFIX, LEDGER_MEMBER, MANIFEST_MEMBER, PUBLIC_KEY_MEMBER,
    SIGNATURE_MEMBER, SIGNATURE_META_MEMBER,
};
use crate::pkg::builder::CONFIG_FILE;
use crate::pkg::manifest::{Metadata, PackageManifest, AGENT_CONFIG_KEY};
use crate::pkg::profile::Profile;
use crate::pkg::signing::{decode_key_material, fingerprint, KeyEncoding, SignatureMeta};
use crate::pkg::value::emit_table;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where a displayed configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// `agent_config` table in the manifest
    Manifest,
    /// `agent/config.toml` member
    AgentFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigView {
    pub source: ConfigSource,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureSummary {
    pub algorithm: Option<String>,
    pub fingerprint: Option<String>,
}

/// What `inspect` reports about a package
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub metadata: Metadata,
    pub entrypoint: String,
    /// Number of ledger lines, when a ledger is present
    pub checksum_entries: Option<usize>,
    pub signature: Option<SignatureSummary>,
    pub profile: Option<Profile>,
    pub services: Option<Vec<String>>,
    /// Number of `agent/**` members
    pub agent_files: usize,
    /// Only populated when configuration display was requested
    pub config: Option<ConfigView>,
}

/// Inspect a package file
pub fn inspect(path: &Path, show_config: bool) -> Result<InspectReport> {
    let archive = PackageArchive::open(path)?;
    inspect_archive(&archive, show_config)
}

/// Inspect an already loaded package
pub fn inspect_archive(archive: &PackageArchive, show_config: bool) -> Result<InspectReport> {
    let text = archive
        .text(MANIFEST_MEMBER)?
        .ok_or_else(|| Error::MissingMember(MANIFEST_MEMBER.to_string()))?;
    let manifest = PackageManifest::parse(&text)?;

    let checksum_entries = archive
        .get(LEDGER_MEMBER)
        .map(|bytes| {
            String::from_utf8_lossy(bytes)
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count()
        });

    let signature = if archive.contains(SIGNATURE_MEMBER) {
        Some(signature_summary(archive))
    } else {
        None
    };

    let config = if show_config {
        config_view(archive, &manifest)?
    } else {
        None
    };

    Ok(InspectReport {
        path: archive.path().to_path_buf(),
        entrypoint: manifest.runtime.entrypoint.clone(),
        checksum_entries,
        signature,
        profile: manifest.artifacts.as_ref().and_then(|a| a.profile),
        services: manifest.compose.as_ref().map(|c| c.services.clone()),
        agent_files: archive.agent_members().count(),
        config,
        metadata: manifest.metadata,
    })
}

fn signature_summary(archive: &PackageArchive) -> SignatureSummary {
    let meta = archive
        .get(SIGNATURE_META_MEMBER)
        .map(|bytes| SignatureMeta::parse(&String::from_utf8_lossy(bytes)))
        .unwrap_or_default();

    // Older packages may lack the meta member; derive the fingerprint.
    let fingerprint = meta.fingerprint.or_else(|| {
        archive
            .get(PUBLIC_KEY_MEMBER)
            .and_then(|pk| decode_key_material(pk, KeyEncoding::Base64).ok())
            .map(|pk| fingerprint(&pk))
    });

    SignatureSummary {
        algorithm: meta.algorithm,
        fingerprint,
    }
}

fn config_view(archive: &PackageArchive, manifest: &PackageManifest) -> Result<Option<ConfigView>> {
    if let Some(config) = &manifest.agent_config {
        return Ok(Some(ConfigView {
            source: ConfigSource::Manifest,
            text: emit_table(AGENT_CONFIG_KEY, config),
        }));
    }

    let member = format!("{}{}", AGENT_PREFIX, CONFIG_FILE);
    Ok(archive.text(&member)?.map(|text| ConfigView {
        source: ConfigSource::AgentFile,
        text,
    }))
}

/// Raw `package.toml` bytes, without any parsing
///
/// For diagnosing manifests that fail to parse. Like [`PackageArchive`],
/// only regular files count and the last duplicate wins.
pub fn manifest_bytes(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;

    let mut manifest = None;
    for_each_member(path, &bytes, |name, reader| {
        if name == MANIFEST_MEMBER {
            let mut data = Vec::new();
            reader
                .read_to_end(&mut data)
                .map_err(|e| Error::archive(path, e))?;
            manifest = Some(data);
        }
        Ok(())
    })?;

    manifest.ok_or_else(|| Error::MissingMember(MANIFEST_MEMBER.to_string()))
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metadata;
        writeln!(f, "Package Metadata")?;
        writeln!(f, "  name: {}", m.name)?;
        writeln!(f, "  version: {}", m.version)?;
        writeln!(f, "  description: {}", m.description)?;
        writeln!(f, "  package_format_version: {}", m.package_format_version)?;
        writeln!(f, "  created_at: {}", m.created_at)?;
        writeln!(f, "  entrypoint: {}", self.entrypoint)?;
        writeln!(f, "  agent files: {}", self.agent_files)?;

        match self.checksum_entries {
            Some(n) => writeln!(f, "  checksums: {} entries", n)?,
            None => writeln!(f, "  checksums: none")?,
        }
        match &self.signature {
            Some(sig) => writeln!(
                f,
                "  signature: {} (fingerprint {})",
                sig.algorithm.as_deref().unwrap_or("unknown"),
                sig.fingerprint.as_deref().unwrap_or("unknown")
            )?,
            None => writeln!(f, "  signature: unsigned")?,
        }
        if let Some(profile) = self.profile {
            writeln!(f, "  profile: {}", profile)?;
        }
        if let Some(services) = &self.services {
            writeln!(f, "  services: {}", services.join(", "))?;
        }

        if let Some(config) = &self.config {
            let heading = match config.source {
                ConfigSource::Manifest => "Agent Config",
                ConfigSource::AgentFile => "Agent Config (from agent/config.toml)",
            };
            writeln!(f)?;
            writeln!(f, "{}", heading)?;
            write!(f, "{}", config.text)?;
            if !config.text.ends_with('\n') {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
