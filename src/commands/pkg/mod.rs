// src/commands/pkg/mod.rs

//! Agent package commands
//!
//! Thin adapters over `l6e_forge::pkg`: collect arguments, call the
//! library, print the result.

mod build;
mod inspect;
mod install;
mod keygen;
mod verify;

pub use build::{cmd_pkg_build, BuildArgs};
pub use inspect::cmd_pkg_inspect;
pub use install::cmd_pkg_install;
pub use keygen::cmd_pkg_keygen;
pub use verify::cmd_pkg_verify;

/// Tri-state flag: explicit on, explicit off, or defer to workspace config
pub(crate) fn flag_override(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
