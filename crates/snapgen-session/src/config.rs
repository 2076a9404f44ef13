//! Session configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::token::DEFAULT_PERMISSIONS;

/// Environment variable holding the signing secret
pub const SECRET_KEY_ENV: &str = "SNAPGEN_SECRET_KEY";

/// Session authority settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Token lifetime in minutes
    pub validity_minutes: i64,
    /// HMAC secret; normally supplied through [`SECRET_KEY_ENV`]
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub token_prefix: String,
    /// Characters in the human-typable display code
    pub display_length: usize,
    /// Session file; `None` keeps sessions in memory only
    pub store_path: Option<PathBuf>,
    /// Address handed to users alongside their token
    pub websocket_url: String,
    pub permissions: Vec<String>,
}

impl SessionConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With signing secret
    #[inline]
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = secret.into();
        self
    }

    /// With token lifetime
    #[inline]
    #[must_use]
    pub fn with_validity_minutes(mut self, minutes: i64) -> Self {
        self.validity_minutes = minutes;
        self
    }

    /// With session file
    #[inline]
    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validity_minutes: 30,
            secret_key: String::new(),
            token_prefix: "snap-mcp-".to_string(),
            display_length: 8,
            store_path: None,
            websocket_url: "ws://localhost:8765".to_string(),
            permissions: DEFAULT_PERMISSIONS.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}
