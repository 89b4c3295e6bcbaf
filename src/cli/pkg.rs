// src/cli/pkg.rs
//! `.l6e` package commands

use clap::Subcommand;
use l6e_forge::pkg::{KeyEncoding, Profile};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum PkgCommands {
    /// Build a package from an agent directory
    Build {
        /// Agent directory (must contain agent.py)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "dist")]
        out_dir: PathBuf,

        /// Package name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Package version
        #[arg(short, long, default_value = "0.1.0")]
        version: String,

        /// Description (defaults to [agent].description in config.toml)
        #[arg(short, long)]
        description: Option<String>,

        /// Private key to sign the checksum ledger with
        #[arg(long)]
        sign_key: Option<PathBuf>,

        /// Key file encoding: auto, hex, base64, raw
        #[arg(long, default_value = "auto")]
        key_encoding: KeyEncoding,

        /// Packaging profile: thin, medium, fat
        #[arg(long)]
        profile: Option<Profile>,

        /// Embed the deployment overlay regardless of profile
        #[arg(long, conflicts_with = "no_overlay")]
        overlay: bool,

        /// Never embed the deployment overlay
        #[arg(long)]
        no_overlay: bool,

        /// Overlay services: "auto" or a comma-separated list
        #[arg(long, default_value = "auto")]
        services: String,

        /// Requirements file to embed
        #[arg(long)]
        requirements: Option<PathBuf>,
    },

    /// Show package metadata
    Inspect {
        /// Path to .l6e package
        package: PathBuf,

        /// Show the embedded agent configuration
        #[arg(long)]
        show_config: bool,

        /// Dump package.toml verbatim without parsing it
        #[arg(long, conflicts_with_all = ["show_config", "json"])]
        manifest_only: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify checksums and signature without installing
    Verify {
        /// Path to .l6e package
        package: PathBuf,

        /// Also verify the ledger signature
        #[arg(long)]
        verify_sig: bool,

        /// Public key to verify against instead of the embedded one
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Key file encoding: auto, hex, base64, raw
        #[arg(long, default_value = "auto")]
        key_encoding: KeyEncoding,

        /// Fail when the package has no checksums.txt
        #[arg(long)]
        require_checksums: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install a package into a workspace
    Install {
        /// Path to .l6e package
        package: PathBuf,

        /// Workspace root (contains forge.toml and agents/)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Replace an existing agent of the same name
        #[arg(long)]
        overwrite: bool,

        /// Skip checksum verification
        #[arg(long)]
        no_verify: bool,

        /// Verify the ledger signature
        #[arg(long)]
        verify_sig: bool,

        /// Public key to verify against instead of the embedded one
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Key file encoding: auto, hex, base64, raw
        #[arg(long, default_value = "auto")]
        key_encoding: KeyEncoding,

        /// Fail when the package has no checksums.txt
        #[arg(long)]
        require_checksums: bool,
    },

    /// Generate an Ed25519 signing key pair
    Keygen {
        /// Output path stem; writes <stem>.key and <stem>.pub
        #[arg(default_value = "l6e-signing")]
        output: PathBuf,

        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },
}
