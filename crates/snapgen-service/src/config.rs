//! Service configuration
//!
//! One TOML document with a table per subsystem. Every field has a default,
//! so a missing file is a working development setup. Secrets stay out of the
//! file and come from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snapgen_bridge::BridgeConfig;
use snapgen_compose::{CacheConfig, GenerationConfig};
use snapgen_session::{SessionConfig, SECRET_KEY_ENV};
use uuid::Uuid;

use crate::admin::AdminConfig;
use crate::error::ServiceError;

/// Environment variable holding the generative backend key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Full service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bridge: BridgeConfig,
    /// Loopback endpoint other processes use to reach the session authority
    pub admin: AdminConfig,
    pub generation: GenerationConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    /// Knowledge base document; the built-in catalog when unset
    pub knowledge_path: Option<PathBuf>,
}

impl ServiceConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TOML file
    ///
    /// # Errors
    /// `ConfigIo` if the file cannot be read, `ConfigParse` if it is not a
    /// valid configuration document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ServiceError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ServiceError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill secrets from `lookup` and align derived fields
    ///
    /// The session secret falls back to a random per-process key, which
    /// invalidates every stored session on restart.
    #[must_use]
    pub fn resolve(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secret) = lookup(SECRET_KEY_ENV).filter(|s| !s.is_empty()) {
            self.session.secret_key = secret;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|s| !s.is_empty()) {
            self.generation.api_key = Some(key);
        }
        if self.session.secret_key.is_empty() {
            tracing::warn!(
                env = SECRET_KEY_ENV,
                "no session secret configured; using a random development key"
            );
            self.session.secret_key = format!(
                "dev-{}{}",
                Uuid::new_v4().simple(),
                Uuid::new_v4().simple()
            );
        }
        self.session.websocket_url = self.bridge.websocket_url();
        self
    }

    /// [`resolve`](Self::resolve) against the process environment
    #[must_use]
    pub fn resolve_from_env(self) -> Self {
        self.resolve(|name| std::env::var(name).ok())
    }
}
