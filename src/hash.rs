// src/hash.rs

//! Digest helpers for the checksum ledger
//!
//! Ledger lines carry an explicit algorithm tag so future digests can be
//! added without changing the line format. Only SHA-256 is accepted today.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Digest algorithm recorded in each ledger line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256 over raw bytes, lowercase hex
    #[default]
    Sha256,
}

impl HashAlgorithm {
    /// Digest length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
        }
    }

    /// Digest length as lowercase hex
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Tag written into ledger lines
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Hex digest of `data`
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => sha256(data),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Digest parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    UnknownAlgorithm(String),
    InvalidLength { expected: usize, got: usize },
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown digest algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid digest length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "digest is not lowercase hex: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// Validate a hex digest for `algorithm`
///
/// Ledger digests must be lowercase; uppercase hex is rejected so that a
/// ledger has exactly one textual form.
pub fn validate_hex(algorithm: HashAlgorithm, value: &str) -> Result<(), HashError> {
    if value.len() != algorithm.hex_len() {
        return Err(HashError::InvalidLength {
            expected: algorithm.hex_len(),
            got: value.len(),
        });
    }
    if !value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return Err(HashError::InvalidHex(value.to_string()));
    }
    Ok(())
}

/// Compute SHA-256 of a byte slice as lowercase hex
#[inline]
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
