//! Error types for program composition
//!
//! Provides error handling for:
//! - Intent extraction and intent checks
//! - Pattern lookup misses
//! - Generative backend failures
//! - Validation of produced programs

use snapgen_program::{Diagnostic, ErrorKind, KnowledgeError};
use snapgen_validate::ValidationError;

/// Main composition error type
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// Nothing in the request could be read as an action
    #[error("could not understand request: {0}")]
    ParseFailure(String),

    /// An intent was extracted but is incomplete or unknown
    #[error("invalid intent: {0}")]
    InvalidIntent(#[from] IntentError),

    /// No pattern for the action
    #[error("no pattern for action '{action}'")]
    PatternMiss { action: String },

    /// Produced program failed validation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Generative path failed
    #[error("generation failed: {0}")]
    Generative(#[from] GenerativeError),

    /// Knowledge base could not be loaded
    #[error("knowledge base error: {0}")]
    Knowledge(#[from] KnowledgeError),

    /// Built-in pattern tables failed to compile
    #[error("pattern table error: {0}")]
    Pattern(#[from] regex::Error),
}

impl ComposeError {
    /// Stable classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParseFailure(_) | Self::InvalidIntent(_) => ErrorKind::ParseFailure,
            Self::PatternMiss { .. } => ErrorKind::PatternMiss,
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::Generative(_) => ErrorKind::GenerativeFailure,
            Self::Knowledge(_) | Self::Pattern(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Generative(e) if e.is_retryable())
    }

    /// Diagnostic with user-facing suggestions
    #[must_use]
    pub fn diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::new(self.kind(), self.to_string());
        match self {
            Self::ParseFailure(_) | Self::InvalidIntent(_) => diagnostic
                .suggest("Describe one action per clause, e.g. 'move 10 steps'", 0.8)
                .suggest("Include numbers with units such as steps, degrees or seconds", 0.6),
            Self::PatternMiss { .. } => {
                diagnostic.suggest("Try a simpler verb like move, turn, jump or say", 0.6)
            }
            Self::Validation(e) => diagnostic
                .with_context("path", e.path())
                .suggest("Rephrase the request more simply", 0.5),
            Self::Generative(GenerativeError::QuotaExceeded { .. }) => {
                diagnostic.suggest("Wait until tomorrow (UTC) or raise the daily quota", 0.9)
            }
            Self::Generative(_) => diagnostic
                .suggest("Check the backend API key and network access", 0.6)
                .suggest("Retry the request", 0.4),
            Self::Knowledge(_) | Self::Pattern(_) => diagnostic,
        }
    }
}

/// Intent check failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown trigger: {0}")]
    UnknownTrigger(String),

    #[error("Move action needs steps or direction")]
    MoveNeedsAmount,

    #[error("Turn action needs degrees")]
    TurnNeedsDegrees,
}

/// Generative backend failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerativeError {
    /// Daily call budget spent
    #[error("daily quota of {limit} calls exhausted")]
    QuotaExceeded { limit: u32 },

    /// No API key configured
    #[error("generative backend is not configured: {0}")]
    NotConfigured(String),

    /// Transport or HTTP-level failure
    #[error("backend request failed: {0}")]
    Backend(String),

    /// Backend answered but not with a usable program
    #[error("malformed backend output: {0}")]
    MalformedOutput(String),

    /// Backend produced a program that failed validation
    #[error("backend program rejected: {0}")]
    Rejected(String),

    /// Every attempt failed
    #[error("all {attempts} attempts failed; last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl GenerativeError {
    /// Check if another attempt could help
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend(_) | Self::MalformedOutput(_) | Self::Rejected(_)
        )
    }
}
