// src/commands/pkg/keygen.rs

//! Ed25519 signing key generation

use anyhow::{Context, Result};
use l6e_forge::pkg;
use std::path::Path;

/// Generate an Ed25519 signing key pair
pub fn cmd_pkg_keygen(output: &Path, force: bool) -> Result<()> {
    let key = pkg::keygen(output, force).context("Failed to generate key pair")?;

    println!("Key pair generated");
    println!("  Private key: {} (keep this secret!)", key.private_path.display());
    println!("  Public key:  {}", key.public_path.display());
    println!("  Fingerprint: {}", key.fingerprint);
    println!();
    println!("To sign a package:");
    println!("  forge pkg build <agent-dir> --sign-key {}", key.private_path.display());

    Ok(())
}
