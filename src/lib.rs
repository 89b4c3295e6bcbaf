// src/lib.rs

//! l6e forge packaging
//!
//! Builds, inspects, verifies and installs `.l6e` agent packages.
//!
//! # Integrity model
//!
//! - Every packaged file and the manifest are listed in `checksums.txt`
//!   with their SHA-256 digest
//! - An optional Ed25519 signature covers the exact ledger bytes
//! - Installs check both before touching the workspace and commit with a
//!   directory rename

mod error;
pub mod hash;
pub mod pkg;
pub mod workspace;

pub use error::{Error, ErrorKind, Result};
pub use workspace::{Workspace, WorkspaceConfig};
