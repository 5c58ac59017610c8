//! Cache keys: a caller-assigned logical id plus a content fingerprint.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic digest of the content a cached value was derived from.
///
/// Always non-empty. Two fingerprints are equal iff their bytes are equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// SHA-256 digest of `content`.
    pub fn of(content: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_ref());
        Self(hasher.finalize().to_vec())
    }

    /// Wrap digest bytes produced elsewhere. Empty input is rejected.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::validation_with_context(
                "fingerprint must not be empty",
                ErrorContext::new()
                    .with_field_path("fingerprint")
                    .with_source("content_cache"),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        self.0.iter().take(4).map(|b| format!("{:02x}", b)).collect()
    }
}

impl TryFrom<Vec<u8>> for Fingerprint {
    type Error = Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

impl From<Fingerprint> for Vec<u8> {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Pluggable digest function used to fingerprint content.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, content: &[u8]) -> Fingerprint;
}

/// Default fingerprinter (SHA-256).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, content: &[u8]) -> Fingerprint {
        Fingerprint::of(content)
    }
}

/// Composite cache key. Equal iff both the logical id and fingerprint match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub logical_id: String,
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn new(logical_id: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            logical_id: logical_id.into(),
            fingerprint,
        }
    }

    /// Key a value against the SHA-256 of `content`.
    pub fn for_content(logical_id: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        Self::new(logical_id, Fingerprint::of(content))
    }

    /// Key a value against `content` using a custom fingerprinter.
    pub fn with_fingerprinter(
        logical_id: impl Into<String>,
        content: &[u8],
        fingerprinter: &dyn Fingerprinter,
    ) -> Self {
        Self::new(logical_id, fingerprinter.fingerprint(content))
    }

    /// Key for a symbol inside a file: logical id `path::symbol`.
    pub fn symbol(path: &str, symbol: &str, content: impl AsRef<[u8]>) -> Self {
        Self::for_content(format!("{}::{}", path, symbol), content)
    }

    pub fn as_str(&self) -> &str {
        &self.logical_id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.logical_id, self.fingerprint.short())
    }
}
