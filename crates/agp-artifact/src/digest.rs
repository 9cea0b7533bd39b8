//! SHA-256 digest primitives
//!
//! Provides [`Sha256Digest`], the strongly-typed digest used for artifact ids,
//! patch content, rollback packages, file contents and state snapshots.
//! Its textual form is always `sha256:<64 lowercase hex>`.

use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Textual prefix of every standalone digest
pub const DIGEST_PREFIX: &str = "sha256:";

/// A 32-byte SHA-256 digest
///
/// Immutable and cheap to clone (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Create a digest from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hash the compact JSON encoding of a serializable value
    ///
    /// # Errors
    /// Returns error if serialization fails
    #[inline]
    pub fn compute_json<T>(value: &T) -> Result<Self, DigestError>
    where
        T: serde::Serialize + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        Ok(Self::compute(&json))
    }

    /// Lowercase hex without the `sha256:` prefix
    #[inline]
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First `len` hex characters (clamped to 64)
    #[inline]
    #[must_use]
    pub fn short_hex(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(64));
        hex
    }

    /// Compare against a stored textual digest
    ///
    /// # Errors
    /// Returns [`DigestError::Mismatch`] if the stored value differs
    pub fn expect_matches(&self, stored: &Sha256Digest) -> Result<(), DigestError> {
        if self == stored {
            Ok(())
        } else {
            Err(DigestError::Mismatch {
                expected: stored.to_string(),
                actual: self.to_string(),
            })
        }
    }
}

impl Display for Sha256Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{DIGEST_PREFIX}{}", hex::encode(self.0))
    }
}

impl FromStr for Sha256Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix(DIGEST_PREFIX)
            .ok_or_else(|| DigestError::MissingPrefix(s.to_string()))?;
        if hex_part.len() != 64 || hex_part.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(DigestError::InvalidLength {
                expected: 64,
                actual: hex_part.len(),
            });
        }
        let bytes = hex::decode(hex_part)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl serde::Serialize for Sha256Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when working with digests
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// Missing `sha256:` prefix
    #[error("digest '{0}' is missing the sha256: prefix")]
    MissingPrefix(String),

    /// Wrong number of hex characters
    #[error("invalid digest length: expected {expected} lowercase hex chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex decoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored digest does not match recomputation
    #[error("digest mismatch: stored {expected}, recomputed {actual}")]
    Mismatch { expected: String, actual: String },
}
