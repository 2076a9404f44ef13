//! Operation results
//!
//! Every operation answers with a success flag plus a result, an error, or
//! both: a failed execution still hands back the program it produced.

use serde::{Deserialize, Serialize};
use snapgen_program::{Diagnostic, ErrorKind, Suggestion};

/// User-facing error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
}

impl From<Diagnostic> for ErrorBody {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            kind: diagnostic.kind,
            message: diagnostic.message,
            suggestions: diagnostic.suggestions,
        }
    }
}

/// Result of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(diagnostic.into()),
        }
    }

    /// Failure that still carries a usable result
    #[must_use]
    pub fn failed_with(result: T, diagnostic: Diagnostic) -> Self {
        Self {
            success: false,
            result: Some(result),
            error: Some(diagnostic.into()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
