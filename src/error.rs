// src/error.rs

//! Error taxonomy for package build, inspection and installation
//!
//! Every variant names the offending path, archive member, or key so the
//! caller can act on it without re-running with extra logging.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for package operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad error classes used by callers to pick an exit path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input: missing entrypoint, malformed key, bad name
    Input,
    /// Checksum or signature failures
    Integrity,
    /// Destination state prevents the operation
    State,
    /// Underlying filesystem or container failure
    Io,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent path not found or not a directory: {0}")]
    AgentNotFound(PathBuf),

    #[error("agent.py not found in: {0}")]
    MissingEntrypoint(PathBuf),

    #[error("Invalid package name '{0}': must be a single non-empty path component")]
    InvalidName(String),

    #[error("Invalid package version '{0}': must not be empty or contain path separators, '..' or NUL")]
    InvalidVersion(String),

    #[error("Manifest missing required field: {0}")]
    MissingField(String),

    #[error("Failed to parse {member}: {message}")]
    Parse { member: String, message: String },

    #[error("Archive member missing: {0}")]
    MissingMember(String),

    #[error("Unsafe archive member path: {0}")]
    UnsafeMemberPath(String),

    #[error("Invalid key material in {path}: {reason}")]
    KeyMaterial { path: PathBuf, reason: String },

    #[error("Unknown packaging profile: {0} (expected thin, medium or fat)")]
    UnknownProfile(String),

    #[error("Unknown overlay service: {0}")]
    UnknownService(String),

    #[error("Failed to render deployment overlay: {0}")]
    Overlay(String),

    #[error("Profile '{profile}' requires a requirements file; none found at {path}")]
    MissingRequirements { profile: String, path: PathBuf },

    #[error("Malformed checksum ledger line {line}: {reason}")]
    LedgerFormat { line: usize, reason: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("checksums.txt lists {0} but the archive has no such member")]
    ChecksumMemberMissing(String),

    #[error("Archive member {0} is not listed in checksums.txt")]
    UnlistedMember(String),

    #[error("Package has no checksums.txt and checksums are required")]
    LedgerRequired,

    #[error("Signature verification requested but {0} is missing")]
    SignatureMissing(String),

    #[error("Signature verification requested but no public key is embedded or supplied")]
    PublicKeyMissing,

    #[error("Signature verification failed (key fingerprint {fingerprint})")]
    SignatureInvalid { fingerprint: String },

    #[error("Signature metadata fingerprint {recorded} does not match public key fingerprint {actual}")]
    FingerprintMismatch { recorded: String, actual: String },

    #[error("Agent already exists: {0} (use --overwrite to replace)")]
    AlreadyExists(PathBuf),

    #[error("Not a workspace (missing {missing}): {root}")]
    NotAWorkspace { root: PathBuf, missing: String },

    #[error("Refusing to overwrite existing file: {0}")]
    FileExists(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },
}

impl Error {
    /// Wrap an I/O error with the path it occurred at
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a container-level failure with the archive path
    pub fn archive(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Classify the error per the input/integrity/state taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AgentNotFound(_)
            | Self::MissingEntrypoint(_)
            | Self::InvalidName(_)
            | Self::InvalidVersion(_)
            | Self::MissingField(_)
            | Self::Parse { .. }
            | Self::MissingMember(_)
            | Self::UnsafeMemberPath(_)
            | Self::KeyMaterial { .. }
            | Self::UnknownProfile(_)
            | Self::UnknownService(_)
            | Self::MissingRequirements { .. } => ErrorKind::Input,
            Self::LedgerFormat { .. }
            | Self::ChecksumMismatch { .. }
            | Self::ChecksumMemberMissing(_)
            | Self::UnlistedMember(_)
            | Self::LedgerRequired
            | Self::SignatureMissing(_)
            | Self::PublicKeyMissing
            | Self::SignatureInvalid { .. }
            | Self::FingerprintMismatch { .. } => ErrorKind::Integrity,
            Self::AlreadyExists(_) | Self::NotAWorkspace { .. } | Self::FileExists(_) => {
                ErrorKind::State
            }
            Self::Io { .. } | Self::Archive { .. } | Self::Overlay(_) => ErrorKind::Io,
        }
    }
}
