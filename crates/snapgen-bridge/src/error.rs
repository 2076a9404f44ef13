//! Error types for the bridge
//!
//! [`ProtocolError`] covers everything a renderer can get wrong on the wire;
//! each variant knows the `connect_error` code and the close code it earns.
//! [`BridgeError`] is what command senders see.

use serde_json::Value;
use snapgen_program::{Diagnostic, ErrorKind};
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Wire-level violations by the peer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// First message was not `connect`
    #[error("Expected connection message")]
    ExpectedConnect,

    #[error("Connection token required")]
    MissingToken,

    /// Token rejected by the session authority
    #[error("{0}")]
    InvalidToken(String),

    #[error("no connect message within {0} seconds")]
    HandshakeTimeout(u64),

    #[error("peer stopped answering heartbeats")]
    HeartbeatTimeout,

    /// Socket went away mid-exchange
    #[error("connection closed by peer")]
    Closed,
}

impl ProtocolError {
    /// `connect_error` code sent to the peer
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::HeartbeatTimeout => "HEARTBEAT_TIMEOUT",
            Self::Closed => "CLOSED",
            _ => "INVALID_MESSAGE",
        }
    }

    /// WebSocket close code for this violation
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Self::InvalidToken(_) => CloseCode::Policy,
            Self::HeartbeatTimeout => CloseCode::Away,
            _ => CloseCode::Protocol,
        }
    }
}

/// Errors from the bridge server and its command surface
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session {0} not connected")]
    NotConnected(String),

    /// No response inside the window; the renderer may still act on it
    #[error("Command {command} timed out after {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("connection for session {0} closed before a response arrived")]
    ConnectionClosed(String),

    /// Renderer answered with an error status
    #[error("renderer reported failure for {command}: {message}")]
    CommandFailed {
        command: String,
        message: String,
        details: Option<Value>,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BridgeError {
    /// Error category for callers that report failures uniformly
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::CorrelationTimeout,
            Self::Protocol(_) | Self::WebSocket(_) => ErrorKind::ProtocolError,
            Self::NotConnected(_) | Self::ConnectionClosed(_) => ErrorKind::SessionFailure,
            Self::Bind { .. } | Self::CommandFailed { .. } | Self::Encode(_) => ErrorKind::Internal,
        }
    }

    /// Check if sending again could help
    ///
    /// A timeout is an unknown outcome, so it is not retryable here.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotConnected(_) | Self::ConnectionClosed(_))
    }

    /// Diagnostic with user-facing suggestions
    #[must_use]
    pub fn diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::new(self.kind(), self.to_string());
        match self {
            Self::NotConnected(_) | Self::ConnectionClosed(_) => diagnostic
                .suggest("Open Snap! and enter the session code in the bridge extension", 0.9)
                .suggest("Check the connection status, then try again", 0.6),
            Self::Timeout { .. } => diagnostic
                .suggest("Look at the Snap! window; the command may still have been applied", 0.7)
                .suggest("Reload Snap! if it stopped responding", 0.4),
            Self::CommandFailed { command, details, .. } => {
                let diagnostic = diagnostic.with_context("command", command.clone());
                match details {
                    Some(details) => diagnostic.with_context("details", details.to_string()),
                    None => diagnostic,
                }
            }
            _ => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_close_codes() {
        assert_eq!(ProtocolError::ExpectedConnect.code(), "INVALID_MESSAGE");
        assert_eq!(u16::from(ProtocolError::ExpectedConnect.close_code()), 1002);
        assert_eq!(ProtocolError::MissingToken.code(), "MISSING_TOKEN");
        assert_eq!(u16::from(ProtocolError::MissingToken.close_code()), 1002);
        let invalid = ProtocolError::InvalidToken("Token has expired.".into());
        assert_eq!(invalid.code(), "INVALID_TOKEN");
        assert_eq!(u16::from(invalid.close_code()), 1008);
        assert_eq!(invalid.to_string(), "Token has expired.");
    }

    #[test]
    fn timeout_kind() {
        let err = BridgeError::Timeout {
            command: "inspect_state".into(),
            timeout_ms: 5000,
        };
        assert_eq!(err.kind(), ErrorKind::CorrelationTimeout);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Command inspect_state timed out after 5000 ms");
    }

    #[test]
    fn failed_command_diagnostic_keeps_details() {
        let err = BridgeError::CommandFailed {
            command: "create_blocks".into(),
            message: "Sprite not found".into(),
            details: Some(serde_json::json!({"sprite": "Cat"})),
        };
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.kind, ErrorKind::Internal);
        assert_eq!(diagnostic.context[0], ("command".to_string(), "create_blocks".to_string()));
        assert!(diagnostic.context[1].1.contains("Cat"));

        let offline = BridgeError::NotConnected("sess_a".into()).diagnostic();
        assert_eq!(offline.suggestions.len(), 2);
    }
}
