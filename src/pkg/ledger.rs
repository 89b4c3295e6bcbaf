// src/pkg/ledger.rs
//! Checksum ledger (`checksums.txt`)
//!
//! One line per covered member: `sha256 <member> <hex>`. The manifest is
//! always first; the remaining entries follow archive order. Consumers
//! compare by path, never by position.

use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use crate::pkg::archive::{PackageArchive, AGENT_PREFIX, LEDGER_MEMBER, SIGNATURE_MEMBERS};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub path: String,
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl LedgerEntry {
    /// Digest `data` for the member at `path`
    pub fn compute(path: &str, data: &[u8]) -> Self {
        let algorithm = HashAlgorithm::Sha256;
        Self {
            path: path.to_string(),
            algorithm,
            digest: algorithm.digest(data),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for `path`
    pub fn push(&mut self, path: &str, data: &[u8]) {
        self.entries.push(LedgerEntry::compute(path, data));
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Recompute a ledger from an archive's own members
    ///
    /// Covers every member except the ledger and signature files, in
    /// archive order. For a package written by the builder this
    /// reproduces the stored ledger byte for byte.
    pub fn derive(archive: &PackageArchive) -> Self {
        let mut ledger = Self::new();
        for member in archive.members() {
            if member.name == LEDGER_MEMBER || SIGNATURE_MEMBERS.contains(&member.name.as_str()) {
                continue;
            }
            ledger.push(&member.name, &member.data);
        }
        ledger
    }

    /// Render the ledger document
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(entry.algorithm.name());
            out.push(' ');
            out.push_str(&entry.path);
            out.push(' ');
            out.push_str(&entry.digest);
            out.push('\n');
        }
        out
    }

    /// Parse a ledger document
    ///
    /// The algorithm runs up to the first space and the digest starts
    /// after the last one, so member paths may contain spaces. Blank
    /// lines are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let malformed = |reason: &str| Error::LedgerFormat {
                line: line_no,
                reason: reason.to_string(),
            };

            let (algo, rest) = line
                .split_once(' ')
                .ok_or_else(|| malformed("expected '<algo> <path> <digest>'"))?;
            let (path, digest) = rest
                .rsplit_once(' ')
                .ok_or_else(|| malformed("expected '<algo> <path> <digest>'"))?;
            if path.is_empty() {
                return Err(malformed("empty member path"));
            }

            let algorithm: HashAlgorithm =
                algo.parse().map_err(|e: hash::HashError| malformed(&e.to_string()))?;
            hash::validate_hex(algorithm, digest).map_err(|e| malformed(&e.to_string()))?;

            entries.push(LedgerEntry {
                path: path.to_string(),
                algorithm,
                digest: digest.to_string(),
            });
        }

        Ok(Self { entries })
    }

    /// Check every entry against the archive's member bytes
    ///
    /// Fails on the first listed member that is absent or whose digest
    /// differs, then on any `agent/**` member the ledger does not list.
    /// Returns the number of entries checked.
    pub fn verify(&self, archive: &PackageArchive) -> Result<usize> {
        let mut listed: HashMap<&str, &LedgerEntry> = HashMap::with_capacity(self.entries.len());

        for entry in &self.entries {
            let data = archive
                .get(&entry.path)
                .ok_or_else(|| Error::ChecksumMemberMissing(entry.path.clone()))?;
            let actual = entry.algorithm.digest(data);
            if actual != entry.digest {
                return Err(Error::ChecksumMismatch {
                    path: entry.path.clone(),
                    expected: entry.digest.clone(),
                    actual,
                });
            }
            debug!("Checksum ok: {}", entry.path);
            listed.insert(entry.path.as_str(), entry);
        }

        for member in archive.members() {
            if member.name.starts_with(AGENT_PREFIX) && !listed.contains_key(member.name.as_str()) {
                return Err(Error::UnlistedMember(member.name.clone()));
            }
        }

        Ok(self.entries.len())
    }
}
