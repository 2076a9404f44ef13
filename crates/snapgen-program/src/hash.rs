//! Request fingerprints for the result cache
//!
//! Provides [`RequestKey`], a strongly-typed 32-byte Blake3 digest that
//! identifies a generation request by its normalized text together with
//! the options that change the generated program.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte request fingerprint (Blake3)
///
/// Two requests that differ only in letter case or surrounding whitespace
/// produce the same key. Copy and cheap to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestKey([u8; 32]);

impl RequestKey {
    /// Create a key from raw digest bytes
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

    /// Fingerprint a request
    ///
    /// The text is trimmed and lowercased before hashing. Target entity and
    /// complexity are folded in with a separator so that
    /// `("ab", "c")` and `("a", "bc")` never collide.
    #[must_use]
    pub fn for_request(text: &str, target: &str, complexity: &str) -> Self {
        let normalized = normalize_request(text);
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(target.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(complexity.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

/// Lowercase and trim a request for cache lookups
#[inline]
#[must_use]
pub fn normalize_request(text: &str) -> String {
    text.trim().to_lowercase()
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for RequestKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

/// Request key parsing errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyError {
    /// Wrong digest length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Not valid hex
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
