// src/commands/pkg/inspect.rs

//! Package inspection
//!
//! Prints the manifest summary, or the full report as JSON with `--json`.

use anyhow::{Context, Result};
use l6e_forge::pkg;
use std::io::Write;
use std::path::Path;

/// Print package metadata, or the raw manifest with `manifest_only`
pub fn cmd_pkg_inspect(package: &Path, show_config: bool, manifest_only: bool, json: bool) -> Result<()> {
    if !package.exists() {
        anyhow::bail!("Package not found: {}", package.display());
    }

    if manifest_only {
        let bytes = pkg::manifest_bytes(package)
            .with_context(|| format!("Failed to read manifest from {}", package.display()))?;
        std::io::stdout()
            .write_all(&bytes)
            .context("Failed to write manifest to stdout")?;
        return Ok(());
    }

    let report = pkg::inspect(package, show_config)
        .with_context(|| format!("Failed to inspect package {}", package.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
        if show_config && report.config.is_none() {
            println!();
            println!("No agent_config found in manifest");
        }
    }

    Ok(())
}
