//! Signed session tokens
//!
//! A token binds a token id to a session id, a validity window and a
//! permission set. The signature is HMAC-SHA256 over the canonical
//! message: compact JSON of those five fields with keys in sorted order.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// Operations a session may request from the renderer
pub const DEFAULT_PERMISSIONS: [&str; 5] = [
    "create_blocks",
    "read_project",
    "execute_script",
    "inspect_state",
    "create_custom_block",
];

/// A signed session credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub token_id: String,
    pub session_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<String>,
    /// Hex HMAC-SHA256 of the canonical message
    pub signature: String,
}

impl SessionToken {
    /// Whether the token is expired at `now`
    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the token grants a permission
    #[inline]
    #[must_use]
    pub fn permits(&self, operation: &str) -> bool {
        self.permissions.iter().any(|p| p == operation)
    }
}

/// Issues and verifies tokens with a shared secret
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Create a signer
    ///
    /// # Errors
    /// Returns [`SessionError::MissingSecret`] for an empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SessionError> {
        let key = secret.as_ref().to_vec();
        if key.is_empty() {
            return Err(SessionError::MissingSecret);
        }
        Ok(Self { key })
    }

    /// Issue a signed token
    ///
    /// # Errors
    /// Returns error if the MAC cannot be keyed.
    pub fn sign(
        &self,
        token_id: impl Into<String>,
        session_id: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        permissions: Vec<String>,
    ) -> Result<SessionToken, SessionError> {
        let mut token = SessionToken {
            token_id: token_id.into(),
            session_id: session_id.into(),
            issued_at,
            expires_at,
            permissions,
            signature: String::new(),
        };
        let mut mac = self.mac()?;
        mac.update(&canonical_message(&token));
        token.signature = hex::encode(mac.finalize().into_bytes());
        Ok(token)
    }

    /// Check a token's signature in constant time
    #[must_use]
    pub fn verify(&self, token: &SessionToken) -> bool {
        let Ok(expected) = hex::decode(&token.signature) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(&canonical_message(token));
        mac.verify_slice(&expected).is_ok()
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| SessionError::MissingSecret)
    }
}

/// Compact JSON of the signed fields, keys sorted
fn canonical_message(token: &SessionToken) -> Vec<u8> {
    let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
    fields.insert("expires_at", Value::from(timestamp(token.expires_at)));
    fields.insert("issued_at", Value::from(timestamp(token.issued_at)));
    fields.insert("permissions", Value::from(token.permissions.clone()));
    fields.insert("session_id", Value::from(token.session_id.as_str()));
    fields.insert("token_id", Value::from(token.token_id.as_str()));
    serde_json::to_vec(&fields).unwrap_or_default()
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Human-typable code for a token id
///
/// The last `-`-separated segment, cut to `len` characters, upper-cased.
#[must_use]
pub fn display_code(token_id: &str, len: usize) -> String {
    let segment = token_id.rsplit('-').next().unwrap_or(token_id);
    segment.chars().take(len).collect::<String>().to_uppercase()
}
