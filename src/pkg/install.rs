// src/pkg/install.rs
//! Package verification and installation
//!
//! Installation runs as a series of gates: parse the manifest, verify
//! checksums, verify the signature, check the destination. Nothing is
//! written to the workspace until every gate passes. Files are then
//! extracted into a hidden staging directory under `agents/` and renamed
//! into place, so a failed install never leaves a partial agent behind.

use crate::error::{Error, Result};
use crate::pkg::archive::{
    safe_relative_path, PackageArchive, AGENT_PREFIX, LEDGER_MEMBER, MANIFEST_MEMBER,
    PUBLIC_KEY_MEMBER, SIGNATURE_MEMBER, SIGNATURE_META_MEMBER,
};
use crate::pkg::ledger::Ledger;
use crate::pkg::manifest::PackageManifest;
use crate::pkg::signing::{
    decode_key_material, fingerprint, load_public_key, verify_signature, KeyEncoding,
    SignatureMeta, ALGORITHM,
};
use crate::workspace::Workspace;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Verification gates to run against a package
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub verify_checksums: bool,
    pub verify_signature: bool,
    /// Public key to verify against instead of the embedded one
    pub public_key: Option<PathBuf>,
    pub key_encoding: KeyEncoding,
    /// Treat a package without `checksums.txt` as an integrity failure
    pub require_checksums: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            verify_signature: false,
            public_key: None,
            key_encoding: KeyEncoding::Auto,
            require_checksums: false,
        }
    }
}

/// Outcome of the verification gates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub name: String,
    pub version: String,
    /// Ledger entries checked; `None` when no ledger was checked
    pub checksum_entries: Option<usize>,
    pub signature_verified: bool,
    /// Fingerprint of the key the signature verified against
    pub fingerprint: Option<String>,
}

impl VerificationReport {
    pub fn checksums_verified(&self) -> bool {
        self.checksum_entries.is_some()
    }
}

/// Install-time options
///
/// `None` fields fall back to the workspace's `[packaging]` settings.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub overwrite: bool,
    pub verify: Option<bool>,
    pub verify_signature: Option<bool>,
    pub public_key: Option<PathBuf>,
    pub key_encoding: KeyEncoding,
    pub require_checksums: Option<bool>,
}

/// Result of a successful install
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub installed_path: PathBuf,
    pub files: usize,
    /// An existing agent directory was replaced
    pub replaced: bool,
    pub verification: VerificationReport,
}

/// Run the checksum and signature gates without installing
pub fn verify(path: &Path, options: &VerifyOptions) -> Result<VerificationReport> {
    let archive = PackageArchive::open(path)?;
    let manifest = read_manifest(&archive)?;
    verify_archive(&archive, &manifest, options)
}

fn read_manifest(archive: &PackageArchive) -> Result<PackageManifest> {
    let text = archive
        .text(MANIFEST_MEMBER)?
        .ok_or_else(|| Error::MissingMember(MANIFEST_MEMBER.to_string()))?;
    let manifest = PackageManifest::parse(&text)?;
    manifest.validate()?;
    Ok(manifest)
}

/// Checksum gate, then signature gate
pub fn verify_archive(
    archive: &PackageArchive,
    manifest: &PackageManifest,
    options: &VerifyOptions,
) -> Result<VerificationReport> {
    let mut report = VerificationReport {
        name: manifest.name().to_string(),
        version: manifest.version().to_string(),
        ..Default::default()
    };

    let ledger_text = archive.text(LEDGER_MEMBER)?;
    match &ledger_text {
        None if options.require_checksums => return Err(Error::LedgerRequired),
        None if options.verify_checksums => {
            warn!(
                "{} has no {}; installing without checksum verification",
                archive.path().display(),
                LEDGER_MEMBER
            );
        }
        Some(text) if options.verify_checksums => {
            let ledger = Ledger::parse(text)?;
            let checked = ledger.verify(archive)?;
            debug!("Verified {} checksum entries", checked);
            report.checksum_entries = Some(checked);
        }
        _ => debug!("Checksum verification disabled"),
    }

    if options.verify_signature {
        let fpr = verify_package_signature(archive, ledger_text.as_deref(), options)?;
        info!("Signature verified (key {})", fpr);
        report.signature_verified = true;
        report.fingerprint = Some(fpr);
    }

    Ok(report)
}

fn verify_package_signature(
    archive: &PackageArchive,
    ledger: Option<&str>,
    options: &VerifyOptions,
) -> Result<String> {
    let signature = archive
        .text(SIGNATURE_MEMBER)?
        .ok_or_else(|| Error::SignatureMissing(SIGNATURE_MEMBER.to_string()))?;
    let ledger = ledger.ok_or_else(|| Error::SignatureMissing(LEDGER_MEMBER.to_string()))?;

    let public_key = match &options.public_key {
        Some(path) => load_public_key(path, options.key_encoding)?,
        None => {
            let embedded = archive
                .get(PUBLIC_KEY_MEMBER)
                .ok_or(Error::PublicKeyMissing)?;
            // undecodable key material simply fails verification below
            decode_key_material(embedded, KeyEncoding::Base64).unwrap_or_else(|_| embedded.to_vec())
        }
    };
    let fpr = fingerprint(&public_key);

    let meta = archive
        .get(SIGNATURE_META_MEMBER)
        .map(|bytes| SignatureMeta::parse(&String::from_utf8_lossy(bytes)))
        .unwrap_or_default();
    if meta.algorithm.as_deref().is_some_and(|a| a != ALGORITHM) {
        return Err(Error::SignatureInvalid { fingerprint: fpr });
    }

    if !verify_signature(ledger.as_bytes(), &signature, &public_key) {
        return Err(Error::SignatureInvalid { fingerprint: fpr });
    }

    if let Some(recorded) = meta.fingerprint {
        if recorded != fpr {
            return Err(Error::FingerprintMismatch {
                recorded,
                actual: fpr,
            });
        }
    }

    Ok(fpr)
}

/// Install a package into a workspace
pub fn install(archive_path: &Path, workspace_root: &Path, options: &InstallOptions) -> Result<InstallReport> {
    let workspace = Workspace::open(workspace_root)?;
    let packaging = &workspace.config().packaging;

    let verify_options = VerifyOptions {
        verify_checksums: options.verify.unwrap_or(packaging.verify),
        verify_signature: options.verify_signature.unwrap_or(packaging.verify_signatures),
        public_key: options
            .public_key
            .clone()
            .or_else(|| workspace.public_key_path()),
        key_encoding: options.key_encoding,
        require_checksums: options.require_checksums.unwrap_or(packaging.require_checksums),
    };

    let archive = PackageArchive::open(archive_path)?;
    let manifest = read_manifest(&archive)?;
    let verification = verify_archive(&archive, &manifest, &verify_options)?;

    let target = workspace.agent_dir(manifest.name());
    let exists = target.exists();
    if exists && !options.overwrite {
        return Err(Error::AlreadyExists(target));
    }

    let mut files: Vec<(PathBuf, &[u8])> = Vec::new();
    for (relative, member) in archive.agent_members() {
        let path = safe_relative_path(&member.name, relative)?;
        files.push((path, member.data.as_slice()));
    }
    if files.is_empty() {
        return Err(Error::MissingMember(format!("{}**", AGENT_PREFIX)));
    }

    let agents_dir = workspace.agents_dir();
    let stage = tempfile::Builder::new()
        .prefix(&format!(".{}.staging-", manifest.name()))
        .tempdir_in(&agents_dir)
        .map_err(|e| Error::io(&agents_dir, e))?;
    debug!("Staging {} files in {}", files.len(), stage.path().display());

    for (relative, data) in &files {
        let dest = stage.path().join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&dest, data).map_err(|e| Error::io(&dest, e))?;
    }

    commit(stage.path(), &target, exists)?;

    info!("Installed {} to {}", manifest.name(), target.display());

    Ok(InstallReport {
        installed_path: target,
        files: files.len(),
        replaced: exists,
        verification,
    })
}

/// Rename the staged directory over `target`
///
/// An existing target is moved aside first and restored if the final
/// rename fails.
fn commit(staged: &Path, target: &Path, replace: bool) -> Result<()> {
    if !replace {
        return fs::rename(staged, target).map_err(|e| Error::io(target, e));
    }

    let mut backup_name = staged.as_os_str().to_owned();
    backup_name.push(".previous");
    let backup = PathBuf::from(backup_name);

    fs::rename(target, &backup).map_err(|e| Error::io(target, e))?;

    if let Err(e) = fs::rename(staged, target) {
        if let Err(restore) = fs::rename(&backup, target) {
            warn!(
                "Failed to restore {} from {}: {}",
                target.display(),
                backup.display(),
                restore
            );
        }
        return Err(Error::io(target, e));
    }

    let removed = if backup.is_dir() {
        fs::remove_dir_all(&backup)
    } else {
        fs::remove_file(&backup)
    };
    if let Err(e) = removed {
        warn!("Failed to remove previous install {}: {}", backup.display(), e);
    }

    Ok(())
}
