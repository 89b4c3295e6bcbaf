// src/commands/pkg/verify.rs

//! Signature verification for `.l6e` packages

use anyhow::{Context, Result};
use l6e_forge::pkg::{self, KeyEncoding, VerifyOptions};
use std::path::{Path, PathBuf};

/// Run the install-time integrity checks without installing
pub fn cmd_pkg_verify(
    package: &Path,
    verify_sig: bool,
    public_key: Option<PathBuf>,
    key_encoding: KeyEncoding,
    require_checksums: bool,
    json: bool,
) -> Result<()> {
    let options = VerifyOptions {
        verify_checksums: true,
        verify_signature: verify_sig,
        public_key,
        key_encoding,
        require_checksums,
    };

    let report = pkg::verify(package, &options)
        .with_context(|| format!("Verification failed for {}", package.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Verified: {} {}", report.name, report.version);
    match report.checksum_entries {
        Some(n) => println!("  checksums: {} entries OK", n),
        None => println!("  checksums: none (package has no checksums.txt)"),
    }
    match &report.fingerprint {
        Some(fpr) => println!("  signature: valid (fingerprint {})", fpr),
        None => println!("  signature: not checked"),
    }

    Ok(())
}
