//! Collaborators injected into the server
//!
//! The server never reaches for globals: token checks and connect/disconnect
//! notifications go through [`SessionGate`], renderer events through
//! [`EventHandler`].

use std::sync::Arc;

use async_trait::async_trait;
use snapgen_session::{PendingWrite, SessionAuthority, SessionError};

use crate::protocol::RendererEvent;

/// Authentication and presence tracking
#[async_trait]
pub trait SessionGate: Send + Sync {
    /// Resolve a display token to a session id, or say why not
    async fn authenticate(&self, token: &str) -> Result<String, String>;

    async fn connected(&self, session_id: &str);

    async fn disconnected(&self, session_id: &str);
}

#[async_trait]
impl SessionGate for SessionAuthority {
    async fn authenticate(&self, token: &str) -> Result<String, String> {
        self.validate(token).map_err(|e| e.to_string())
    }

    async fn connected(&self, session_id: &str) {
        persist(session_id, "connection", self.stage_connected(session_id)).await;
    }

    async fn disconnected(&self, session_id: &str) {
        persist(session_id, "disconnection", self.stage_disconnected(session_id)).await;
    }
}

/// Store writes leave the runtime threads
async fn persist(session_id: &str, change: &str, staged: Result<PendingWrite, SessionError>) {
    let result = match staged {
        Ok(write) => match tokio::task::spawn_blocking(move || write.persist()).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(%session_id, change, error = %e, "session write task failed");
                return;
            }
        },
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!(%session_id, change, error = %e, "failed to record session change");
    }
}

/// Receiver of unsolicited renderer events
///
/// Each connection feeds its events to one worker task in arrival order.
/// The connection keeps reading while a handler runs, so handlers may send
/// commands to the renderer that raised the event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, session_id: &str, event: &RendererEvent);
}

/// Logs events and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEvents;

#[async_trait]
impl EventHandler for LoggingEvents {
    async fn on_event(&self, session_id: &str, event: &RendererEvent) {
        tracing::info!(%session_id, event_type = %event.event_type, "renderer event");
    }
}

/// Everything the server needs from the outside
#[derive(Clone)]
pub struct BridgeDeps {
    pub sessions: Arc<dyn SessionGate>,
    pub events: Arc<dyn EventHandler>,
}

impl BridgeDeps {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionGate>) -> Self {
        Self {
            sessions,
            events: Arc::new(LoggingEvents),
        }
    }

    /// With event handler
    #[inline]
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for BridgeDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeDeps").finish_non_exhaustive()
    }
}
