// src/commands/mod.rs
//! Command handlers for the forge CLI

pub mod pkg;

pub use pkg::{cmd_pkg_build, cmd_pkg_inspect, cmd_pkg_install, cmd_pkg_keygen, cmd_pkg_verify};
