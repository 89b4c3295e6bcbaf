// src/pkg/signing.rs
//! Package signing
//!
//! Ed25519 signatures over the exact bytes of the checksum ledger. The
//! ledger's per-member digests then certify the content, so a single
//! signature covers the whole package.
//!
//! Key files may hold hex, base64 or raw bytes. Auto-detection tries hex
//! first (trimmed text of even length, all hex digits), then strict
//! base64, then falls back to the raw file bytes. A 44-character base64
//! string that happens to be all hex digits would be read as hex; pass an
//! explicit [`KeyEncoding`] when that ambiguity matters.

use crate::error::{Error, Result};
use crate::hash;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Algorithm tag recorded in `signature.meta`
pub const ALGORITHM: &str = "ed25519";

/// Length of a key fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 40;

/// How key file contents are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    #[default]
    Auto,
    Hex,
    Base64,
    Raw,
}

impl KeyEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Hex => "hex",
            Self::Base64 => "base64",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            "raw" => Ok(Self::Raw),
            other => Err(format!(
                "unknown key encoding '{}' (expected auto, hex, base64 or raw)",
                other
            )),
        }
    }
}

/// Decode key file contents
pub fn decode_key_material(raw: &[u8], encoding: KeyEncoding) -> std::result::Result<Vec<u8>, String> {
    let trimmed = || {
        std::str::from_utf8(raw)
            .map(str::trim)
            .map_err(|_| "key file is not valid UTF-8 text".to_string())
    };

    match encoding {
        KeyEncoding::Hex => hex::decode(trimmed()?).map_err(|e| format!("invalid hex: {}", e)),
        KeyEncoding::Base64 => BASE64
            .decode(trimmed()?)
            .map_err(|e| format!("invalid base64: {}", e)),
        KeyEncoding::Raw => Ok(raw.to_vec()),
        KeyEncoding::Auto => {
            if let Ok(text) = trimmed() {
                if looks_like_hex(text) {
                    if let Ok(bytes) = hex::decode(text) {
                        return Ok(bytes);
                    }
                }
                if !text.is_empty() {
                    if let Ok(bytes) = BASE64.decode(text) {
                        return Ok(bytes);
                    }
                }
            }
            Ok(raw.to_vec())
        }
    }
}

fn looks_like_hex(text: &str) -> bool {
    !text.is_empty() && text.len() % 2 == 0 && text.chars().all(|c| c.is_ascii_hexdigit())
}

fn read_key_file(path: &Path, encoding: KeyEncoding) -> Result<Vec<u8>> {
    let raw = fs::read(path).map_err(|e| Error::io(path, e))?;
    decode_key_material(&raw, encoding).map_err(|reason| Error::KeyMaterial {
        path: path.to_path_buf(),
        reason,
    })
}

/// Build a signing key from decoded private key bytes
///
/// Accepts a 32-byte seed, or 64 bytes of seed followed by the matching
/// public key.
pub fn signing_key_from_bytes(bytes: &[u8]) -> std::result::Result<SigningKey, String> {
    match bytes.len() {
        32 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes[..32]);
            let key = SigningKey::from_bytes(&seed);
            if key.verifying_key().as_bytes() != &bytes[32..] {
                return Err("public half of 64-byte key does not match its seed".to_string());
            }
            Ok(key)
        }
        n => Err(format!("expected a 32-byte seed or 64-byte keypair, got {} bytes", n)),
    }
}

/// Load a private key file
pub fn load_signing_key(path: &Path, encoding: KeyEncoding) -> Result<SigningKey> {
    let bytes = read_key_file(path, encoding)?;
    signing_key_from_bytes(&bytes).map_err(|reason| Error::KeyMaterial {
        path: path.to_path_buf(),
        reason,
    })
}

/// Load a public key file as raw 32-byte key material
pub fn load_public_key(path: &Path, encoding: KeyEncoding) -> Result<Vec<u8>> {
    let bytes = read_key_file(path, encoding)?;
    if bytes.len() != 32 {
        return Err(Error::KeyMaterial {
            path: path.to_path_buf(),
            reason: format!("expected a 32-byte public key, got {} bytes", bytes.len()),
        });
    }
    Ok(bytes)
}

/// First 40 hex characters of SHA-256 over the public key bytes
pub fn fingerprint(public_key: &[u8]) -> String {
    let mut digest = hash::sha256(public_key);
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Signature members of a signed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureBlock {
    pub algorithm: String,
    /// Base64 signature bytes
    pub signature: String,
    /// Base64 public key bytes
    pub public_key: String,
    pub fingerprint: String,
}

impl SignatureBlock {
    /// Sign the ledger document
    pub fn sign(ledger: &[u8], key: &SigningKey) -> Self {
        let signature = key.sign(ledger);
        let public_key = key.verifying_key();

        Self {
            algorithm: ALGORITHM.to_string(),
            signature: BASE64.encode(signature.to_bytes()),
            public_key: BASE64.encode(public_key.as_bytes()),
            fingerprint: fingerprint(public_key.as_bytes()),
        }
    }

    /// `signature.meta` contents
    pub fn render_meta(&self) -> String {
        format!("algo={}\nfpr={}\n", self.algorithm, self.fingerprint)
    }
}

/// Parsed `signature.meta`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignatureMeta {
    pub algorithm: Option<String>,
    pub fingerprint: Option<String>,
}

impl SignatureMeta {
    /// Parse `key=value` lines; unknown keys and junk lines are ignored
    pub fn parse(text: &str) -> Self {
        let mut meta = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim() {
                "algo" => meta.algorithm = Some(value),
                "fpr" => meta.fingerprint = Some(value),
                _ => {}
            }
        }
        meta
    }
}

/// Verify a base64 signature over `message`
///
/// Any structural problem (bad base64, wrong signature or key length, a
/// key that is not a valid curve point) is a failed verification.
pub fn verify_signature(message: &[u8], signature_b64: &str, public_key: &[u8]) -> bool {
    let Ok(sig_bytes) = BASE64.decode(signature_b64.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

/// Files written by [`keygen`]
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub private_path: PathBuf,
    pub public_path: PathBuf,
    pub fingerprint: String,
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Generate a key pair at `<stem>.key` (hex seed) and `<stem>.pub` (base64)
pub fn keygen(stem: &Path, force: bool) -> Result<GeneratedKey> {
    let private_path = with_suffix(stem, ".key");
    let public_path = with_suffix(stem, ".pub");

    if !force {
        for path in [&private_path, &public_path] {
            if path.exists() {
                return Err(Error::FileExists(path.clone()));
            }
        }
    }

    if let Some(parent) = private_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = signing_key.verifying_key();

    fs::write(&private_path, format!("{}\n", hex::encode(signing_key.to_bytes())))
        .map_err(|e| Error::io(&private_path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::io(&private_path, e))?;
    }

    fs::write(&public_path, format!("{}\n", BASE64.encode(public_key.as_bytes())))
        .map_err(|e| Error::io(&public_path, e))?;

    Ok(GeneratedKey {
        private_path,
        public_path,
        fingerprint: fingerprint(public_key.as_bytes()),
    })
}
