// src/main.rs

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, PkgCommands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Pkg(command) => match command {
            PkgCommands::Build {
                path,
                out_dir,
                name,
                version,
                description,
                sign_key,
                key_encoding,
                profile,
                overlay,
                no_overlay,
                services,
                requirements,
            } => commands::cmd_pkg_build(commands::pkg::BuildArgs {
                path,
                out_dir,
                name,
                version,
                description,
                sign_key,
                key_encoding,
                profile,
                overlay,
                no_overlay,
                services,
                requirements,
            }),
            PkgCommands::Inspect {
                package,
                show_config,
                manifest_only,
                json,
            } => commands::cmd_pkg_inspect(&package, show_config, manifest_only, json),
            PkgCommands::Verify {
                package,
                verify_sig,
                public_key,
                key_encoding,
                require_checksums,
                json,
            } => commands::cmd_pkg_verify(
                &package,
                verify_sig,
                public_key,
                key_encoding,
                require_checksums,
                json,
            ),
            PkgCommands::Install {
                package,
                workspace,
                overwrite,
                no_verify,
                verify_sig,
                public_key,
                key_encoding,
                require_checksums,
            } => commands::cmd_pkg_install(
                &package,
                &workspace,
                overwrite,
                no_verify,
                verify_sig,
                public_key,
                key_encoding,
                require_checksums,
            ),
            PkgCommands::Keygen { output, force } => commands::cmd_pkg_keygen(&output, force),
        },
    }
}
