//! Wire messages
//!
//! Renderer -> server frames are JSON objects discriminated by `type`:
//! `connect`, `response`, `event` and `ping`. Server -> renderer frames are
//! [`ServerMessage`] variants serialized the same way.

use std::borrow::Cow;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snapgen_program::truncate_chars;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ProtocolError;

/// First message of every connection
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    pub token: Option<String>,
    /// Session the client believes it belongs to; the token decides
    pub session_id: Option<String>,
    pub client_info: Option<Value>,
}

/// Renderer reply to a command
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommandResponse {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub status: Option<String>,
    pub payload: Value,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl CommandResponse {
    /// Id of the command this answers
    ///
    /// `correlation_id` when present, else the echoed `message_id`.
    #[must_use]
    pub fn correlation(&self) -> Option<&str> {
        self.correlation_id
            .as_deref()
            .or(self.message_id.as_deref())
    }

    /// Top-level status, else the status inside the payload
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status
            .as_deref()
            .or_else(|| self.payload.get("status").and_then(Value::as_str))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == Some("success")
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status() == Some("error")
    }

    /// Useful part of the reply: `payload`, else `result`
    #[must_use]
    pub fn body(&self) -> Value {
        match (&self.payload, &self.result) {
            (Value::Null, Some(result)) => result.clone(),
            (payload, _) => payload.clone(),
        }
    }

    /// Human-readable failure text
    #[must_use]
    pub fn error_message(&self) -> String {
        let error = self
            .error
            .as_ref()
            .or_else(|| self.payload.get("error"));
        match error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(o)) => o
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
            _ => "Unknown error".to_string(),
        }
    }
}

/// Unsolicited renderer notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RendererEvent {
    pub event_type: String,
    /// Every other field of the frame
    pub data: Map<String, Value>,
}

/// Parsed renderer frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connect(ConnectRequest),
    Response(CommandResponse),
    Event(RendererEvent),
    /// Application-level ping; `timestamp` is echoed into the latency figure
    Ping { timestamp: Option<Value> },
}

impl Inbound {
    /// Parse one text frame
    ///
    /// # Errors
    /// `Malformed` for invalid JSON, a non-object, or a missing `type`;
    /// `UnknownType` for any other `type`.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::Malformed("expected a JSON object".to_string()));
        };
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(ProtocolError::Malformed("missing message type".to_string())),
        };

        let body = Value::Object(fields);
        let decode = |e: serde_json::Error| ProtocolError::Malformed(format!("{kind}: {e}"));
        match kind.as_str() {
            "connect" => serde_json::from_value(body).map(Self::Connect).map_err(decode),
            "response" => serde_json::from_value(body).map(Self::Response).map_err(decode),
            "event" => {
                let Value::Object(mut data) = body else {
                    return Err(ProtocolError::Malformed("event".to_string()));
                };
                let event_type = match data.remove("event_type") {
                    Some(Value::String(s)) => s,
                    _ => String::new(),
                };
                Ok(Self::Event(RendererEvent { event_type, data }))
            }
            "ping" => Ok(Self::Ping {
                timestamp: body.get("timestamp").cloned(),
            }),
            _ => Err(ProtocolError::UnknownType(kind.clone())),
        }
    }
}

/// Capabilities advertised in `connect_ack`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerCapabilities {
    pub max_message_size: usize,
    pub supported_commands: Vec<String>,
    pub protocol_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandOptions {
    pub timeout_ms: u64,
    pub retry_on_failure: bool,
    pub require_confirmation: bool,
}

/// Outbound command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandFrame {
    pub message_id: String,
    pub timestamp: String,
    pub session_id: String,
    pub command: String,
    pub payload: Value,
    pub options: CommandOptions,
}

impl CommandFrame {
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        session_id: impl Into<String>,
        command: impl Into<String>,
        payload: Value,
        timeout_ms: u64,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            timestamp: now_rfc3339(),
            session_id: session_id.into(),
            command: command.into(),
            payload,
            options: CommandOptions {
                timeout_ms,
                retry_on_failure: false,
                require_confirmation: false,
            },
        }
    }
}

/// Server -> renderer frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectAck {
        status: String,
        session_id: String,
        server_capabilities: ServerCapabilities,
        protocol_version: String,
        keep_alive_interval: u64,
    },
    ConnectError {
        status: String,
        error: ErrorBody,
    },
    Command(CommandFrame),
    Pong {
        timestamp: String,
        latency_ms: i64,
    },
}

impl ServerMessage {
    /// Rejection for a failed handshake
    #[must_use]
    pub fn connect_error(error: &ProtocolError) -> Self {
        Self::ConnectError {
            status: "rejected".to_string(),
            error: ErrorBody {
                code: error.code().to_string(),
                message: error.to_string(),
            },
        }
    }

    /// Reply to an application ping
    ///
    /// A numeric `timestamp` (milliseconds since the epoch) yields a latency.
    #[must_use]
    pub fn pong(ping_timestamp: Option<&Value>) -> Self {
        let now = Utc::now();
        let latency_ms = ping_timestamp
            .and_then(Value::as_i64)
            .map_or(0, |sent| (now.timestamp_millis() - sent).max(0));
        Self::Pong {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            latency_ms,
        }
    }

    /// Encode as a text frame
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

/// Close frame with a reason short enough for the control-frame limit
pub(crate) fn close_frame(code: CloseCode, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Owned(truncate_chars(reason, 60).to_string()),
    }))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_each_inbound_type() {
        let connect = Inbound::parse(r#"{"type":"connect","token":"AB12CD34"}"#).unwrap();
        assert_eq!(
            connect,
            Inbound::Connect(ConnectRequest {
                token: Some("AB12CD34".into()),
                ..ConnectRequest::default()
            })
        );

        let Inbound::Response(resp) =
            Inbound::parse(r#"{"type":"response","message_id":"msg_1","status":"success","payload":{"ok":1}}"#)
                .unwrap()
        else {
            panic!("expected response");
        };
        assert_eq!(resp.correlation(), Some("msg_1"));
        assert!(resp.is_success());
        assert_eq!(resp.body(), json!({"ok": 1}));

        let Inbound::Event(event) =
            Inbound::parse(r#"{"type":"event","event_type":"green_flag","sprite":"Cat"}"#).unwrap()
        else {
            panic!("expected event");
        };
        assert_eq!(event.event_type, "green_flag");
        assert_eq!(event.data["sprite"], "Cat");
        assert!(!event.data.contains_key("type"));

        assert_eq!(
            Inbound::parse(r#"{"type":"ping"}"#).unwrap(),
            Inbound::Ping { timestamp: None }
        );
    }

    #[test]
    fn correlation_id_wins_over_message_id() {
        let resp: CommandResponse = serde_json::from_value(json!({
            "message_id": "resp_9", "correlation_id": "msg_1"
        }))
        .unwrap();
        assert_eq!(resp.correlation(), Some("msg_1"));
    }

    #[test]
    fn rejects_bad_frames() {
        assert!(matches!(Inbound::parse("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(Inbound::parse("[1,2]"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(Inbound::parse(r#"{"token":"x"}"#), Err(ProtocolError::Malformed(_))));
        assert_eq!(
            Inbound::parse(r#"{"type":"launch"}"#),
            Err(ProtocolError::UnknownType("launch".into()))
        );
        assert!(matches!(
            Inbound::parse(r#"{"type":"connect","token":5}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn error_responses() {
        let resp: CommandResponse = serde_json::from_value(json!({
            "status": "error", "error": {"code": "X", "message": "sprite missing"}
        }))
        .unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.error_message(), "sprite missing");

        let nested: CommandResponse =
            serde_json::from_value(json!({"payload": {"status": "error", "error": "boom"}})).unwrap();
        assert!(nested.is_error());
        assert_eq!(nested.error_message(), "boom");
    }

    #[test]
    fn server_messages_are_tagged() {
        let value = serde_json::to_value(ServerMessage::connect_error(&ProtocolError::MissingToken)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "connect_error",
                "status": "rejected",
                "error": {"code": "MISSING_TOKEN", "message": "Connection token required"}
            })
        );

        let frame = CommandFrame::new("msg_1", "sess_1", "inspect_state", json!({}), 5000);
        let value = serde_json::to_value(ServerMessage::Command(frame)).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["options"]["timeout_ms"], 5000);
        assert_eq!(value["options"]["retry_on_failure"], false);
    }

    #[test]
    fn pong_latency() {
        let sent = Utc::now().timestamp_millis() - 40;
        let ServerMessage::Pong { latency_ms, .. } = ServerMessage::pong(Some(&json!(sent))) else {
            panic!("expected pong");
        };
        assert!(latency_ms >= 40);

        let ServerMessage::Pong { latency_ms, .. } = ServerMessage::pong(Some(&json!("soon"))) else {
            panic!("expected pong");
        };
        assert_eq!(latency_ms, 0);
    }
}
