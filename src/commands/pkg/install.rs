// src/commands/pkg/install.rs

//! `forge pkg install` handler

use super::flag_override;
use anyhow::{Context, Result};
use l6e_forge::pkg::{self, InstallOptions, KeyEncoding};
use std::path::{Path, PathBuf};

/// Install a package into a workspace
#[allow(clippy::too_many_arguments)]
pub fn cmd_pkg_install(
    package: &Path,
    workspace: &Path,
    overwrite: bool,
    no_verify: bool,
    verify_sig: bool,
    public_key: Option<PathBuf>,
    key_encoding: KeyEncoding,
    require_checksums: bool,
) -> Result<()> {
    let options = InstallOptions {
        overwrite,
        verify: flag_override(false, no_verify),
        verify_signature: flag_override(verify_sig, false),
        public_key,
        key_encoding,
        require_checksums: flag_override(require_checksums, false),
    };

    let report = pkg::install(package, workspace, &options)
        .with_context(|| format!("Failed to install package {}", package.display()))?;

    println!("Installed agent to: {}", report.installed_path.display());
    println!("  files: {}", report.files);
    if report.replaced {
        println!("  replaced existing agent");
    }
    if let Some(n) = report.verification.checksum_entries {
        println!("  checksums: {} entries verified", n);
    }
    if let Some(fpr) = &report.verification.fingerprint {
        println!("  signature: verified (fingerprint {})", fpr);
    }

    Ok(())
}
