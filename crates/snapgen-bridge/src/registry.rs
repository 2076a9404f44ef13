//! Connection registry and pending-response table
//!
//! Both are shared by every connection task and every command sender, so
//! both are concurrent maps. A connection is registered under its session
//! id; a reconnect for the same session replaces the older handle.

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::error::BridgeError;
use crate::protocol::{close_frame, CommandResponse};

/// Sending side of one live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: u64,
    session_id: String,
    sender: mpsc::Sender<Message>,
}

impl ConnectionHandle {
    #[must_use]
    pub(crate) fn new(conn_id: u64, session_id: impl Into<String>, sender: mpsc::Sender<Message>) -> Self {
        Self {
            conn_id,
            session_id: session_id.into(),
            sender,
        }
    }

    /// Queue a frame for the connection's writer
    ///
    /// # Errors
    /// `NotConnected` once the connection task has gone.
    pub async fn send(&self, message: Message) -> Result<(), BridgeError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| BridgeError::NotConnected(self.session_id.clone()))
    }

    /// Ask the connection to close without waiting for queue space
    pub(crate) fn close_nowait(&self, code: CloseCode, reason: &str) {
        if self.sender.try_send(close_frame(code, reason)).is_err() {
            tracing::debug!(session_id = %self.session_id, "close request not queued");
        }
    }

    #[inline]
    #[must_use]
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// session id -> live connection
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the one it replaced
    pub fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.connections.insert(handle.session_id.clone(), handle)
    }

    /// Remove a session's connection if it is still `conn_id`
    ///
    /// Returns false when a newer connection has taken the slot.
    pub fn remove(&self, session_id: &str, conn_id: u64) -> bool {
        self.connections
            .remove_if(session_id, |_, handle| handle.conn_id == conn_id)
            .is_some()
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<ConnectionHandle> {
        self.connections.get(session_id).map(|h| h.value().clone())
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.connections.contains_key(session_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }
}

#[derive(Debug)]
struct Waiter {
    session_id: String,
    reply: oneshot::Sender<CommandResponse>,
}

/// correlation id -> caller waiting for the response
#[derive(Debug, Default)]
pub struct PendingResponses {
    waiting: DashMap<String, Waiter>,
}

impl PendingResponses {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for `message_id`
    pub fn register(
        &self,
        message_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> oneshot::Receiver<CommandResponse> {
        let (reply, rx) = oneshot::channel();
        self.waiting.insert(
            message_id.into(),
            Waiter {
                session_id: session_id.into(),
                reply,
            },
        );
        rx
    }

    /// Hand a response to its waiter
    ///
    /// Only responses arriving on the session the command went to count.
    /// Returns false when nobody is waiting (unknown, timed out or foreign).
    pub fn resolve(&self, correlation_id: &str, session_id: &str, response: CommandResponse) -> bool {
        let Some((_, waiter)) = self
            .waiting
            .remove_if(correlation_id, |_, w| w.session_id == session_id)
        else {
            return false;
        };
        waiter.reply.send(response).is_ok()
    }

    /// Stop waiting for `message_id`
    pub fn cancel(&self, message_id: &str) -> bool {
        self.waiting.remove(message_id).is_some()
    }

    /// Drop every waiter of a session; their callers see the connection close
    pub fn drop_session(&self, session_id: &str) -> usize {
        let before = self.waiting.len();
        self.waiting.retain(|_, w| w.session_id != session_id);
        before.saturating_sub(self.waiting.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(conn_id: u64, session: &str) -> (ConnectionHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(4);
        (ConnectionHandle::new(conn_id, session, tx), rx)
    }

    #[test]
    fn stale_connection_cannot_remove_newer_one() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle(1, "sess_a");
        let (second, _rx2) = handle(2, "sess_a");

        assert!(registry.register(first).is_none());
        let replaced = registry.register(second).unwrap();
        assert_eq!(replaced.conn_id(), 1);

        assert!(!registry.remove("sess_a", 1));
        assert!(registry.contains("sess_a"));
        assert!(registry.remove("sess_a", 2));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn send_after_close_is_not_connected() {
        let (h, rx) = handle(1, "sess_a");
        drop(rx);
        let err = h.send(Message::Text("x".into())).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected(id) if id == "sess_a"));
    }

    #[tokio::test]
    async fn resolve_delivers_once() {
        let pending = PendingResponses::new();
        let rx = pending.register("msg_1", "sess_a");

        let response = CommandResponse {
            status: Some("success".into()),
            ..CommandResponse::default()
        };
        assert!(pending.resolve("msg_1", "sess_a", response.clone()));
        assert!(!pending.resolve("msg_1", "sess_a", response));
        assert!(rx.await.unwrap().is_success());
        assert!(pending.is_empty());
    }

    #[test]
    fn foreign_session_cannot_resolve() {
        let pending = PendingResponses::new();
        let _rx = pending.register("msg_1", "sess_a");
        assert!(!pending.resolve("msg_1", "sess_b", CommandResponse::default()));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn dropping_a_session_wakes_its_waiters() {
        let pending = PendingResponses::new();
        let rx_a = pending.register("msg_1", "sess_a");
        let _rx_b = pending.register("msg_2", "sess_b");

        assert_eq!(pending.drop_session("sess_a"), 1);
        assert!(rx_a.await.is_err());
        assert_eq!(pending.len(), 1);
        assert!(pending.cancel("msg_2"));
    }
}
