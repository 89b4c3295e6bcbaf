// src/commands/pkg/build.rs

//! `forge pkg build`: package an agent directory into a `.l6e` archive

use super::flag_override;
use anyhow::{Context, Result};
use l6e_forge::pkg::{self, BuildOptions, KeyEncoding, Profile, ServiceSelection};
use std::path::PathBuf;

/// Arguments for `forge pkg build`
pub struct BuildArgs {
    pub path: PathBuf,
    pub out_dir: PathBuf,
    pub name: Option<String>,
    pub version: String,
    pub description: Option<String>,
    pub sign_key: Option<PathBuf>,
    pub key_encoding: KeyEncoding,
    pub profile: Option<Profile>,
    pub overlay: bool,
    pub no_overlay: bool,
    pub services: String,
    pub requirements: Option<PathBuf>,
}

/// Build a package from an agent directory
pub fn cmd_pkg_build(args: BuildArgs) -> Result<()> {
    let options = BuildOptions {
        name: args.name,
        version: Some(args.version),
        description: args.description,
        sign_key: args.sign_key,
        key_encoding: args.key_encoding,
        profile: args.profile,
        include_overlay: flag_override(args.overlay, args.no_overlay),
        services: ServiceSelection::parse(&args.services),
        requirements: args.requirements,
        source_date_epoch: None,
    };

    let outcome = pkg::build(&args.path, &args.out_dir, &options)
        .with_context(|| format!("Failed to build package from {}", args.path.display()))?;

    println!("Built package: {}", outcome.archive_path.display());
    println!("  {} {}", outcome.manifest.name(), outcome.manifest.version());
    println!("  checksums: {} entries", outcome.ledger.len());
    if let Some(fpr) = &outcome.fingerprint {
        println!("  signed: ed25519 (fingerprint {})", fpr);
    }
    if let Some(compose) = &outcome.manifest.compose {
        println!("  overlay services: {}", compose.services.join(", "));
    }

    Ok(())
}
