//! Admin endpoint
//!
//! The serving process owns the session authority. Other processes (the
//! `snapgen session` command, test harnesses) ask it for sessions over a
//! loopback WebSocket instead of writing the session file themselves.
//!
//! Each text frame carries one [`AdminRequest`]; the reply is the
//! operation's [`Outcome`] as JSON.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snapgen_program::{Diagnostic, ErrorKind};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ServiceError;
use crate::outcome::Outcome;
use crate::service::SnapService;

/// Where the admin endpoint listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub host: String,
    pub port: u16,
    /// Client-side wait for a reply
    pub request_timeout_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8766,
            request_timeout_ms: 5000,
        }
    }
}

impl AdminConfig {
    #[inline]
    #[must_use]
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.address())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_user() -> String {
    "default".to_string()
}

/// One admin call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminRequest {
    StartSession {
        #[serde(default = "default_user")]
        user_id: String,
    },
    ListSessions,
    PurgeExpired,
}

/// Session as listed by the admin endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub display_token: String,
    pub connected: bool,
    pub expires_at: DateTime<Utc>,
}

/// Loopback server answering [`AdminRequest`]s
#[derive(Debug, Clone)]
pub struct AdminServer {
    service: Arc<SnapService>,
}

impl AdminServer {
    #[must_use]
    pub fn new(service: Arc<SnapService>) -> Self {
        Self { service }
    }

    /// Bind the configured address
    ///
    /// # Errors
    /// Returns `AdminBind` if the address is unavailable.
    pub async fn bind(config: &AdminConfig) -> Result<TcpListener, ServiceError> {
        let addr = config.address();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServiceError::AdminBind { addr, source })
    }

    /// Serve an already bound listener on a background task
    pub fn spawn(&self, listener: TcpListener) -> JoinHandle<()> {
        tokio::spawn(self.clone().serve(listener))
    }

    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.handle_connection(stream, peer).await });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "admin accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_connection(self, stream: TcpStream, peer: SocketAddr) {
        let mut ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "admin upgrade failed");
                return;
            }
        };
        while let Some(frame) = ws.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            let reply = match serde_json::from_str::<AdminRequest>(&text) {
                Ok(request) => {
                    tracing::debug!(%peer, ?request, "admin request");
                    self.handle(request).await
                }
                Err(e) => to_json(&Outcome::<()>::failed(Diagnostic::new(
                    ErrorKind::ProtocolError,
                    format!("invalid admin request: {e}"),
                ))),
            };
            if ws.send(Message::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    }

    /// Run one request against the service
    pub async fn handle(&self, request: AdminRequest) -> Value {
        let service = Arc::clone(&self.service);
        // session calls write the store
        let reply = tokio::task::spawn_blocking(move || match request {
            AdminRequest::StartSession { user_id } => to_json(&service.start_session(&user_id)),
            AdminRequest::ListSessions => to_json(&Outcome::ok(
                service
                    .authority()
                    .list()
                    .into_iter()
                    .map(|s| SessionSummary {
                        expires_at: s.expires_at(),
                        session_id: s.session_id,
                        user_id: s.user_id,
                        display_token: s.display_token,
                        connected: s.connected,
                    })
                    .collect::<Vec<_>>(),
            )),
            AdminRequest::PurgeExpired => match service.purge_expired() {
                Ok(purged) => to_json(&Outcome::ok(purged)),
                Err(e) => to_json(&Outcome::<usize>::failed(e.diagnostic())),
            },
        })
        .await;
        reply.unwrap_or_else(|e| {
            tracing::error!(error = %e, "admin request task failed");
            to_json(&Outcome::<()>::failed(Diagnostic::new(
                ErrorKind::Internal,
                "admin request failed",
            )))
        })
    }
}

fn to_json<T: Serialize>(outcome: &Outcome<T>) -> Value {
    serde_json::to_value(outcome).unwrap_or_else(|e| {
        serde_json::json!({
            "success": false,
            "error": {"kind": "internal", "message": e.to_string()}
        })
    })
}

/// Send one request to a running server and return its reply
///
/// # Errors
/// `AdminConnect` if the endpoint cannot be reached, `AdminReply` if it
/// answers with something other than one JSON document in time.
pub async fn admin_request(config: &AdminConfig, request: &AdminRequest) -> Result<Value, ServiceError> {
    let url = config.url();
    let connect_err = |source: tokio_tungstenite::tungstenite::Error| ServiceError::AdminConnect {
        url: url.clone(),
        source,
    };
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(connect_err)?;
    let body = serde_json::to_string(request)
        .map_err(|e| ServiceError::AdminReply(e.to_string()))?;
    ws.send(Message::Text(body)).await.map_err(connect_err)?;

    let reply = tokio::time::timeout(config.request_timeout(), async {
        while let Some(frame) = ws.next().await {
            match frame.map_err(connect_err)? {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| ServiceError::AdminReply(e.to_string()))
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(ServiceError::AdminReply("connection closed before a reply".to_string()))
    })
    .await
    .map_err(|_| ServiceError::AdminReply(format!("no reply within {} ms", config.request_timeout_ms)))??;

    let _ = ws.close(None).await;
    Ok(reply)
}
