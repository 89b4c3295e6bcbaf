// src/pkg/mod.rs

//! `.l6e` agent packages
//!
//! A package is a compressed archive holding an agent's source tree, a
//! deterministic manifest, a checksum ledger over every covered member,
//! and optionally an Ed25519 signature over that ledger plus deployment
//! artifacts chosen by a packaging profile.
//!
//! Pipeline:
//! - [`builder`] scans the agent directory, composes the manifest and
//!   ledger, signs, and writes the archive atomically
//! - [`inspector`] reports on a package without modifying anything
//! - [`install`] verifies checksums and signature, then stages and renames
//!   the agent into a workspace

pub mod archive;
pub mod builder;
pub mod compose;
pub mod inspector;
pub mod install;
pub mod ledger;
pub mod manifest;
pub mod profile;
pub mod signing;
pub mod value;

pub use archive::PackageArchive;
pub use builder::{build, build_with, BuildOptions, BuildOutcome, BuildPlan};
pub use compose::{OverlayGenerator, TemplateOverlay};
pub use inspector::{inspect, manifest_bytes, InspectReport};
pub use install::{
    install, verify, InstallOptions, InstallReport, VerificationReport, VerifyOptions,
};
pub use ledger::{Ledger, LedgerEntry};
pub use manifest::PackageManifest;
pub use profile::{Profile, ServiceSelection};
pub use signing::{keygen, KeyEncoding, SignatureBlock};
pub use value::{ConfigTable, ConfigValue, Scalar};
