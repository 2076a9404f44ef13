//! Error classification shared across crates
//!
//! Every crate keeps its own `thiserror` enum; each of those maps onto an
//! [`ErrorKind`] so that callers get one stable taxonomy, plus a
//! [`Diagnostic`] carrying suggestions for the user.

use serde::{Deserialize, Serialize};

/// Stable error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request text could not be read into intents
    ParseFailure,
    /// No known pattern for the requested action
    PatternMiss,
    /// Program failed a validation gate
    ValidationFailure,
    /// Generative backend failed, refused, or ran out of quota
    GenerativeFailure,
    /// Renderer connection or wire protocol problem
    ProtocolError,
    /// Renderer did not answer a command in time
    CorrelationTimeout,
    /// Session missing, expired or rejected
    SessionFailure,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ParseFailure => "parse_failure",
            Self::PatternMiss => "pattern_miss",
            Self::ValidationFailure => "validation_failure",
            Self::GenerativeFailure => "generative_failure",
            Self::ProtocolError => "protocol_error",
            Self::CorrelationTimeout => "correlation_timeout",
            Self::SessionFailure => "session_failure",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suggestion shown alongside an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub description: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
}

impl Suggestion {
    #[inline]
    #[must_use]
    pub fn new(description: impl Into<String>, confidence: f64) -> Self {
        Self {
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Classified error with context and suggestions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<(String, String)>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

impl Diagnostic {
    #[inline]
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Add context entry
    #[inline]
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Add a suggestion
    #[inline]
    #[must_use]
    pub fn suggest(mut self, description: impl Into<String>, confidence: f64) -> Self {
        self.suggestions.push(Suggestion::new(description, confidence));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CorrelationTimeout).unwrap();
        assert_eq!(json, "\"correlation_timeout\"");
        assert_eq!(ErrorKind::PatternMiss.to_string(), "pattern_miss");
    }

    #[test]
    fn diagnostic_builder() {
        let d = Diagnostic::new(ErrorKind::SessionFailure, "Token has expired.")
            .with_context("token", "ABCD1234")
            .suggest("Start a new session", 1.5);
        assert_eq!(d.context.len(), 1);
        assert!((d.suggestions[0].confidence - 1.0).abs() < f64::EPSILON);
    }
}
