//! Service wiring errors
//!
//! Operation failures never surface here; they are reported through
//! [`Outcome`](crate::Outcome). These are the errors of building the
//! service in the first place.

use std::path::PathBuf;

use snapgen_bridge::BridgeError;
use snapgen_compose::{ComposeError, GenerativeError};
use snapgen_program::KnowledgeError;
use snapgen_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("knowledge base: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("generator: {0}")]
    Compose(#[from] ComposeError),

    #[error("generative backend: {0}")]
    Backend(#[from] GenerativeError),

    #[error("sessions: {0}")]
    Session(#[from] SessionError),

    #[error("bridge: {0}")]
    Bridge(#[from] BridgeError),

    #[error("failed to bind admin endpoint {addr}: {source}")]
    AdminBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("admin endpoint {url} unreachable (is `snapgen serve` running?): {source}")]
    AdminConnect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("bad admin reply: {0}")]
    AdminReply(String),
}
