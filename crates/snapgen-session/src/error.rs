//! Session errors

use std::path::PathBuf;

use snapgen_program::{Diagnostic, ErrorKind};
use thiserror::Error;

/// Errors from the session authority
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session carries the presented display token
    #[error("Session not found for this token.")]
    NotFound,

    #[error("Token has expired.")]
    Expired,

    /// Presented before the token's issue time
    #[error("Token is not valid yet.")]
    NotYetValid,

    /// Stored token no longer matches its signature
    #[error("token signature mismatch for session '{session_id}'")]
    InvalidSignature { session_id: String },

    /// Session id is not (or no longer) known
    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("session secret key must not be empty")]
    MissingSecret,

    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Error category for callers that report failures uniformly
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(_) => ErrorKind::Internal,
            _ => ErrorKind::SessionFailure,
        }
    }

    /// Whether the client may fix this by requesting a new token
    #[inline]
    #[must_use]
    pub const fn needs_new_token(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Expired | Self::NotYetValid | Self::InvalidSignature { .. }
        )
    }

    /// Diagnostic with user-facing suggestions
    #[must_use]
    pub fn diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::new(self.kind(), self.to_string());
        if self.needs_new_token() || matches!(self, Self::UnknownSession(_)) {
            diagnostic.suggest("Start a new session and enter the new code in Snap!", 0.9)
        } else {
            diagnostic
        }
    }
}

/// Errors from a session store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode sessions: {0}")]
    Encode(#[from] serde_json::Error),
}
