// src/cli/mod.rs
//! CLI definitions for forge
//!
//! Only argument parsing lives here; handlers are in the `commands` module.

use clap::{Parser, Subcommand};

mod pkg;

pub use pkg::PkgCommands;

#[derive(Parser)]
#[command(name = "forge")]
#[command(version)]
#[command(about = "Build, inspect, verify and install .l6e agent packages", long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Agent package commands
    #[command(subcommand)]
    Pkg(PkgCommands),
}
