// src/pkg/builder.rs
//! Package builder
//!
//! Builds a `.l6e` package from an agent source directory. Every input is
//! read and digested before the output is opened; the archive is written
//! to a temporary file in the output directory and renamed into place, so
//! a failed build never leaves a partial package behind.

use crate::error::{Error, Result};
use crate::pkg::archive::{
    agent_member_name, ArchiveWriter, DEFAULT_MTIME, LEDGER_MEMBER, MANIFEST_MEMBER,
    OVERLAY_MEMBER, PACKAGE_EXTENSION, PUBLIC_KEY_MEMBER, REQUIREMENTS_MEMBER,
    SIGNATURE_MEMBER, SIGNATURE_META_MEMBER,
};
use crate::pkg::compose::{OverlayGenerator, TemplateOverlay};
use crate::pkg::ledger::Ledger;
use crate::pkg::manifest::{validate_name, validate_version, Artifacts, ComposeSection, PackageManifest};
use crate::pkg::profile::{plan_artifacts, Profile, ServiceSelection};
use crate::pkg::signing::{load_signing_key, KeyEncoding, SignatureBlock};
use crate::pkg::value::ConfigTable;
use chrono::{SecondsFormat, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File that marks a directory as an agent
pub const ENTRYPOINT_FILE: &str = "agent.py";

/// Agent configuration embedded as `agent_config`
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_VERSION: &str = "0.1.0";

/// Directory names never packaged (checked below the agent root only)
pub const SKIP_DIRS: [&str; 6] = [".git", ".hg", ".svn", "__pycache__", ".venv", "venv"];

/// Options for a single build
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Defaults to the agent directory's name
    pub name: Option<String>,
    /// Defaults to [`DEFAULT_VERSION`]
    pub version: Option<String>,
    /// Defaults to `[agent].description` from `config.toml`, then empty
    pub description: Option<String>,
    /// Private key file; the package is signed when set
    pub sign_key: Option<PathBuf>,
    pub key_encoding: KeyEncoding,
    pub profile: Option<Profile>,
    /// Overrides the profile's overlay default
    pub include_overlay: Option<bool>,
    pub services: ServiceSelection,
    pub requirements: Option<PathBuf>,
    /// Fixed build time in seconds since the epoch; overrides `SOURCE_DATE_EPOCH`
    pub source_date_epoch: Option<i64>,
}

/// Result of a successful build
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub archive_path: PathBuf,
    pub manifest: PackageManifest,
    pub ledger: Ledger,
    /// Signing key fingerprint for signed builds
    pub fingerprint: Option<String>,
}

/// A packaged source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub member: String,
    pub data: Vec<u8>,
}

/// Everything a package contains, resolved and digested but not yet written
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub manifest: PackageManifest,
    pub manifest_text: String,
    pub ledger: Ledger,
    pub ledger_text: String,
    pub signature: Option<SignatureBlock>,
    pub overlay: Option<String>,
    pub requirements: Option<Vec<u8>>,
    pub sources: Vec<SourceFile>,
    pub mtime: u64,
}

impl BuildPlan {
    /// Resolve, read and digest every input for a package
    pub fn prepare(
        agent_dir: &Path,
        options: &BuildOptions,
        overlay_generator: &dyn OverlayGenerator,
    ) -> Result<Self> {
        if !agent_dir.is_dir() {
            return Err(Error::AgentNotFound(agent_dir.to_path_buf()));
        }
        if !agent_dir.join(ENTRYPOINT_FILE).is_file() {
            return Err(Error::MissingEntrypoint(agent_dir.to_path_buf()));
        }

        let name = match &options.name {
            Some(name) => name.clone(),
            None => default_name(agent_dir)?,
        };
        validate_name(&name)?;
        let version = options
            .version
            .clone()
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        validate_version(&version)?;

        let config = load_agent_config(agent_dir);
        let description = resolve_description(options.description.as_deref(), config.as_ref());

        let plan = plan_artifacts(
            agent_dir,
            options.profile,
            options.include_overlay,
            &options.services,
            options.requirements.as_deref(),
            config.as_ref(),
        )?;

        let overlay = match &plan.services {
            Some(services) => Some(overlay_generator.generate(services)?),
            None => None,
        };
        let requirements = match &plan.requirements {
            Some(path) => Some(fs::read(path).map_err(|e| Error::io(path, e))?),
            None => None,
        };

        let sources = scan_agent_dir(agent_dir)?;
        debug!("Scanned {} source files in {}", sources.len(), agent_dir.display());

        let (created_at, mtime) = build_timestamp(options.source_date_epoch);

        let mut manifest = PackageManifest::new(&name, &version, &description, &created_at)
            .with_agent_config(config);
        if plan.records_artifacts() {
            manifest.artifacts = Some(Artifacts {
                profile: plan.profile,
                requirements: requirements.as_ref().map(|_| REQUIREMENTS_MEMBER.to_string()),
            });
        }
        if let Some(services) = &plan.services {
            manifest.compose = Some(ComposeSection {
                file: OVERLAY_MEMBER.to_string(),
                services: services.clone(),
            });
        }
        let manifest_text = manifest.to_toml();

        let mut ledger = Ledger::new();
        ledger.push(MANIFEST_MEMBER, manifest_text.as_bytes());
        if let Some(overlay) = &overlay {
            ledger.push(OVERLAY_MEMBER, overlay.as_bytes());
        }
        if let Some(requirements) = &requirements {
            ledger.push(REQUIREMENTS_MEMBER, requirements);
        }
        for source in &sources {
            ledger.push(&source.member, &source.data);
        }
        let ledger_text = ledger.render();

        let signature = match &options.sign_key {
            Some(key_path) => {
                let key = load_signing_key(key_path, options.key_encoding)?;
                let block = SignatureBlock::sign(ledger_text.as_bytes(), &key);
                debug!("Signed ledger with key {}", block.fingerprint);
                Some(block)
            }
            None => None,
        };

        Ok(Self {
            manifest,
            manifest_text,
            ledger,
            ledger_text,
            signature,
            overlay,
            requirements,
            sources,
            mtime,
        })
    }

    /// Output file name: `<name>-<version>.l6e`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.manifest.name(),
            self.manifest.version(),
            PACKAGE_EXTENSION
        )
    }

    /// Write the package into `out_dir`, atomically replacing any file of
    /// the same name
    pub fn write(&self, out_dir: &Path) -> Result<PathBuf> {
        validate_name(self.manifest.name())?;
        validate_version(self.manifest.version())?;
        fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
        let archive_path = out_dir.join(self.file_name());

        let mut temp = NamedTempFile::new_in(out_dir).map_err(|e| Error::io(out_dir, e))?;
        let temp_path = temp.path().to_path_buf();

        let mut writer = ArchiveWriter::new(temp.as_file_mut(), self.mtime);
        let write_err = |e| Error::io(&temp_path, e);

        writer
            .append(MANIFEST_MEMBER, self.manifest_text.as_bytes())
            .map_err(write_err)?;
        writer
            .append(LEDGER_MEMBER, self.ledger_text.as_bytes())
            .map_err(write_err)?;
        if let Some(sig) = &self.signature {
            writer
                .append(SIGNATURE_MEMBER, sig.signature.as_bytes())
                .map_err(write_err)?;
            writer
                .append(PUBLIC_KEY_MEMBER, sig.public_key.as_bytes())
                .map_err(write_err)?;
            writer
                .append(SIGNATURE_META_MEMBER, sig.render_meta().as_bytes())
                .map_err(write_err)?;
        }
        if let Some(overlay) = &self.overlay {
            writer
                .append(OVERLAY_MEMBER, overlay.as_bytes())
                .map_err(write_err)?;
        }
        if let Some(requirements) = &self.requirements {
            writer
                .append(REQUIREMENTS_MEMBER, requirements)
                .map_err(write_err)?;
        }
        for source in &self.sources {
            writer.append(&source.member, &source.data).map_err(write_err)?;
        }
        writer.finish().map_err(write_err)?;

        temp.as_file().sync_all().map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o644))
                .map_err(write_err)?;
        }

        temp.persist(&archive_path)
            .map_err(|e| Error::io(&archive_path, e.error))?;

        Ok(archive_path)
    }
}

/// Build a package with the built-in overlay templates
pub fn build(agent_dir: &Path, out_dir: &Path, options: &BuildOptions) -> Result<BuildOutcome> {
    build_with(agent_dir, out_dir, options, &TemplateOverlay::new())
}

/// Build a package using a caller-supplied overlay generator
pub fn build_with(
    agent_dir: &Path,
    out_dir: &Path,
    options: &BuildOptions,
    overlay_generator: &dyn OverlayGenerator,
) -> Result<BuildOutcome> {
    let plan = BuildPlan::prepare(agent_dir, options, overlay_generator)?;
    let archive_path = plan.write(out_dir)?;

    info!(
        "Built {} ({} ledger entries{})",
        archive_path.display(),
        plan.ledger.len(),
        if plan.signature.is_some() { ", signed" } else { "" }
    );

    Ok(BuildOutcome {
        archive_path,
        fingerprint: plan.signature.map(|s| s.fingerprint),
        manifest: plan.manifest,
        ledger: plan.ledger,
    })
}

fn default_name(agent_dir: &Path) -> Result<String> {
    let resolved = fs::canonicalize(agent_dir).map_err(|e| Error::io(agent_dir, e))?;
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidName(resolved.display().to_string()))
}

/// Collect every packaged file under `agent_dir` in sorted order
///
/// Version-control, bytecode-cache and virtualenv directories are pruned.
/// Only regular files are packaged; symlinks are skipped.
pub fn scan_agent_dir(agent_dir: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(agent_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && e.file_name().to_str().is_some_and(|n| SKIP_DIRS.contains(&n)))
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| agent_dir.to_path_buf());
            Error::io(path, e.into())
        })?;

        if entry.file_type().is_symlink() {
            debug!("Skipping symlink: {}", entry.path().display());
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(agent_dir)
            .map_err(|_| Error::archive(entry.path(), "path escapes agent directory"))?;
        let data = fs::read(entry.path()).map_err(|e| Error::io(entry.path(), e))?;

        files.push(SourceFile {
            member: agent_member_name(relative),
            data,
        });
    }

    Ok(files)
}

/// Read `config.toml` from the agent directory, best effort
///
/// A missing file yields `None`; an unreadable or malformed one is logged
/// and also yields `None`.
pub fn load_agent_config(agent_dir: &Path) -> Option<ConfigTable> {
    let path = agent_dir.join(CONFIG_FILE);
    if !path.is_file() {
        return None;
    }

    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Skipping unreadable {}: {}", path.display(), e);
            return None;
        }
    };

    match ConfigTable::parse(&text) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("Skipping malformed {}: {}", path.display(), e);
            None
        }
    }
}

/// Explicit description, else `[agent].description`, else empty
pub fn resolve_description(explicit: Option<&str>, config: Option<&ConfigTable>) -> String {
    if let Some(description) = explicit {
        return description.to_string();
    }
    config
        .and_then(|c| c.get_str(&["agent", "description"]))
        .unwrap_or_default()
        .to_string()
}

/// `created_at` text and member mtime
///
/// An explicit epoch wins over `SOURCE_DATE_EPOCH`; either fixes both
/// values. Without one the manifest carries the current time and members
/// use [`DEFAULT_MTIME`].
pub fn build_timestamp(epoch: Option<i64>) -> (String, u64) {
    let epoch = epoch.or_else(|| {
        std::env::var("SOURCE_DATE_EPOCH")
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
    });

    match epoch.and_then(|secs| Utc.timestamp_opt(secs, 0).single().map(|t| (secs, t))) {
        Some((secs, time)) => (
            time.to_rfc3339_opts(SecondsFormat::Secs, true),
            u64::try_from(secs).unwrap_or(DEFAULT_MTIME),
        ),
        None => (
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            DEFAULT_MTIME,
        ),
    }
}
