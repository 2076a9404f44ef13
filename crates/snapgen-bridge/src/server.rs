//! Bridge protocol server
//!
//! One task per renderer connection:
//! 1. WebSocket upgrade with the configured frame limits
//! 2. handshake: the first frame must be `connect` with a token the
//!    [`SessionGate`](crate::SessionGate) accepts, within the handshake timeout
//! 3. registration, `connected` notification, `connect_ack`
//! 4. message loop: queued commands out, responses/events/pings in, heartbeat
//! 5. teardown: deregistration, waiters woken, `disconnected` notification
//!
//! Protocol violations close the socket with the close code the violation
//! carries. Command senders talk to a connection through its registry handle
//! and wait on a correlation entry with a timeout.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use snapgen_program::GeneratedProgram;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use uuid::Uuid;

use crate::command::{Command, SUPPORTED_COMMANDS};
use crate::config::BridgeConfig;
use crate::deps::BridgeDeps;
use crate::error::{BridgeError, ProtocolError};
use crate::protocol::{
    close_frame, CommandFrame, CommandResponse, Inbound, RendererEvent, ServerCapabilities,
    ServerMessage,
};
use crate::registry::{ConnectionHandle, ConnectionRegistry, PendingResponses};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Point-in-time server statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub total_connections: u64,
    pub total_messages: u64,
    pub total_commands: u64,
    pub errors: u64,
    pub active_connections: usize,
    pub pending_responses: usize,
}

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicU64,
    messages: AtomicU64,
    commands: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// WebSocket server for renderer connections
#[derive(Debug)]
pub struct BridgeServer {
    config: BridgeConfig,
    deps: BridgeDeps,
    registry: ConnectionRegistry,
    pending: PendingResponses,
    counters: Counters,
    next_conn: AtomicU64,
}

impl BridgeServer {
    #[must_use]
    pub fn new(config: BridgeConfig, deps: BridgeDeps) -> Arc<Self> {
        Arc::new(Self {
            config,
            deps,
            registry: ConnectionRegistry::new(),
            pending: PendingResponses::new(),
            counters: Counters::default(),
            next_conn: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bind the configured address
    ///
    /// # Errors
    /// Returns `Bind` if the address is unavailable.
    pub async fn bind(&self) -> Result<TcpListener, BridgeError> {
        let addr = self.config.address();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })
    }

    /// Bind and serve until the task is dropped
    ///
    /// # Errors
    /// Returns `Bind` if the address is unavailable.
    pub async fn run(self: Arc<Self>) -> Result<(), BridgeError> {
        let listener = self.bind().await?;
        tracing::info!(url = %self.config.websocket_url(), "bridge listening");
        self.serve(listener).await;
        Ok(())
    }

    /// Serve an already bound listener on a background task
    pub fn spawn(self: &Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).serve(listener))
    }

    /// Accept connections forever
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move { server.handle_connection(stream, peer).await });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);

        let ws = match accept_async_with_config(stream, Some(ws_config)).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "websocket upgrade failed");
                return;
            }
        };
        Counters::bump(&self.counters.connections);
        let (mut sink, mut source) = ws.split();

        let session_id = match self.handshake(&mut source).await {
            Ok(session_id) => session_id,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(%peer, code = e.code(), reason = %e, "handshake rejected");
                if e != ProtocolError::Closed {
                    reject(&mut sink, &e).await;
                }
                return;
            }
        };

        let (tx, rx) = mpsc::channel(self.config.outbound_queue.max(1));
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = self
            .registry
            .register(ConnectionHandle::new(conn_id, &session_id, tx))
        {
            tracing::info!(%session_id, "replacing older connection");
            old.close_nowait(CloseCode::Normal, "replaced by a newer connection");
        }
        self.deps.sessions.connected(&session_id).await;

        let result = match self.connect_ack(&session_id).to_message() {
            Ok(ack) => match sink.send(ack).await {
                Ok(()) => {
                    tracing::info!(%session_id, %peer, "renderer connected");
                    self.connection_loop(&session_id, &mut sink, &mut source, rx)
                        .await
                }
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(()) => tracing::info!(%session_id, "renderer disconnected"),
            Err(BridgeError::Protocol(e)) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(%session_id, reason = %e, "closing connection on protocol error");
                let close = close_frame(e.close_code(), &e.to_string());
                let _ = tokio::time::timeout(Duration::from_secs(1), sink.send(close)).await;
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(%session_id, error = %e, "connection failed");
            }
        }

        if self.registry.remove(&session_id, conn_id) {
            let dropped = self.pending.drop_session(&session_id);
            self.deps.sessions.disconnected(&session_id).await;
            tracing::debug!(%session_id, dropped, "connection torn down");
        }
    }

    async fn handshake(&self, source: &mut WsSource) -> Result<String, ProtocolError> {
        let text = tokio::time::timeout(self.config.handshake_timeout(), next_text(source))
            .await
            .map_err(|_| ProtocolError::HandshakeTimeout(self.config.handshake_timeout_secs))??;

        let request = match Inbound::parse(&text) {
            Ok(Inbound::Connect(request)) => request,
            Ok(_) | Err(ProtocolError::UnknownType(_)) => return Err(ProtocolError::ExpectedConnect),
            Err(e) => return Err(e),
        };
        let token = request
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ProtocolError::MissingToken)?;

        let session_id = self
            .deps
            .sessions
            .authenticate(token)
            .await
            .map_err(ProtocolError::InvalidToken)?;
        if let Some(claimed) = request.session_id.as_deref() {
            if claimed != session_id {
                tracing::warn!(claimed, %session_id, "client claimed another session; using the token's");
            }
        }
        Ok(session_id)
    }

    fn connect_ack(&self, session_id: &str) -> ServerMessage {
        ServerMessage::ConnectAck {
            status: "accepted".to_string(),
            session_id: session_id.to_string(),
            server_capabilities: ServerCapabilities {
                max_message_size: self.config.max_message_size,
                supported_commands: SUPPORTED_COMMANDS.iter().map(ToString::to_string).collect(),
                protocol_version: self.config.protocol_version.clone(),
            },
            protocol_version: self.config.protocol_version.clone(),
            keep_alive_interval: self.config.keep_alive_interval_ms,
        }
    }

    async fn connection_loop(
        &self,
        session_id: &str,
        sink: &mut WsSink,
        source: &mut WsSource,
        mut outbound: mpsc::Receiver<Message>,
    ) -> Result<(), BridgeError> {
        let interval = self.config.heartbeat_interval();
        let grace = interval + self.config.heartbeat_timeout();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();
        let events = self.spawn_event_worker(session_id);

        loop {
            tokio::select! {
                queued = outbound.recv() => {
                    let Some(message) = queued else {
                        return Ok(());
                    };
                    let closing = matches!(message, Message::Close(_));
                    sink.send(message).await?;
                    if closing {
                        return Ok(());
                    }
                }
                frame = source.next() => {
                    last_seen = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.route(session_id, &text, sink, &events).await?;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            let text = String::from_utf8(bytes).map_err(|_| {
                                ProtocolError::Malformed("binary frame is not UTF-8".to_string())
                            })?;
                            self.route(session_id, &text, sink, &events).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > grace {
                        return Err(ProtocolError::HeartbeatTimeout.into());
                    }
                    sink.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }

    /// Events are handled in arrival order off the connection task, so a
    /// handler may itself send commands to the same renderer.
    fn spawn_event_worker(&self, session_id: &str) -> mpsc::UnboundedSender<RendererEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel::<RendererEvent>();
        let handler = Arc::clone(&self.deps.events);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.on_event(&session_id, &event).await;
            }
        });
        tx
    }

    async fn route(
        &self,
        session_id: &str,
        text: &str,
        sink: &mut WsSink,
        events: &mpsc::UnboundedSender<RendererEvent>,
    ) -> Result<(), BridgeError> {
        Counters::bump(&self.counters.messages);
        match Inbound::parse(text)? {
            Inbound::Response(response) => {
                let Some(message_id) = response.correlation().map(str::to_string) else {
                    tracing::warn!(%session_id, "response without correlation id dropped");
                    return Ok(());
                };
                if self.pending.resolve(&message_id, session_id, response) {
                    tracing::debug!(%session_id, %message_id, "response delivered");
                } else {
                    tracing::debug!(%session_id, %message_id, "no caller waiting; response dropped");
                }
            }
            Inbound::Event(event) => {
                if events.send(event).is_err() {
                    tracing::warn!(%session_id, "event worker gone; event dropped");
                }
            }
            Inbound::Ping { timestamp } => {
                sink.send(ServerMessage::pong(timestamp.as_ref()).to_message()?)
                    .await?;
            }
            Inbound::Connect(_) => tracing::debug!(%session_id, "repeated connect ignored"),
        }
        Ok(())
    }

    /// Whether a renderer is attached for `session_id`
    #[must_use]
    pub fn is_connected(&self, session_id: &str) -> bool {
        self.registry.contains(session_id)
    }

    #[must_use]
    pub fn connected_sessions(&self) -> Vec<String> {
        self.registry.session_ids()
    }

    /// Send a command and wait for its response with the default timeout
    ///
    /// # Errors
    /// `NotConnected`, `Timeout` (outcome unknown), `ConnectionClosed`, or an
    /// encoding error.
    pub async fn send_command(
        &self,
        session_id: &str,
        command: &Command,
    ) -> Result<CommandResponse, BridgeError> {
        self.send_command_with_timeout(session_id, command, self.config.command_timeout())
            .await
    }

    /// [`send_command`](Self::send_command) with an explicit timeout
    ///
    /// # Errors
    /// See [`BridgeServer::send_command`].
    pub async fn send_command_with_timeout(
        &self,
        session_id: &str,
        command: &Command,
        timeout: Duration,
    ) -> Result<CommandResponse, BridgeError> {
        let handle = self
            .registry
            .get(session_id)
            .ok_or_else(|| BridgeError::NotConnected(session_id.to_string()))?;

        let message_id = format!("msg_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let frame = CommandFrame::new(
            message_id.clone(),
            session_id,
            command.name(),
            command.payload()?,
            timeout_ms,
        );
        let message = ServerMessage::Command(frame).to_message()?;

        let reply = self.pending.register(message_id.clone(), session_id);
        if let Err(e) = handle.send(message).await {
            self.pending.cancel(&message_id);
            return Err(e);
        }
        Counters::bump(&self.counters.commands);
        tracing::debug!(%session_id, %message_id, command = command.name(), "command sent");

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(BridgeError::ConnectionClosed(session_id.to_string())),
            Err(_) => {
                self.pending.cancel(&message_id);
                tracing::warn!(%session_id, %message_id, command = command.name(), timeout_ms, "command timed out");
                Err(BridgeError::Timeout {
                    command: command.name().to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// Send a command and return the response body, failing on error replies
    async fn request(&self, session_id: &str, command: &Command) -> Result<Value, BridgeError> {
        let response = self.send_command(session_id, command).await?;
        if response.is_error() {
            return Err(BridgeError::CommandFailed {
                command: command.name().to_string(),
                message: response.error_message(),
                details: response
                    .payload
                    .get("details")
                    .cloned()
                    .or_else(|| response.error.clone()),
            });
        }
        Ok(response.body())
    }

    /// Materialize a program in the renderer
    ///
    /// # Errors
    /// See [`BridgeServer::send_command`]; error replies become `CommandFailed`.
    pub async fn create_blocks(
        &self,
        session_id: &str,
        program: &GeneratedProgram,
        animate: bool,
    ) -> Result<Value, BridgeError> {
        let command = Command::CreateBlocks {
            program: program.clone(),
            animate,
        };
        self.request(session_id, &command).await
    }

    /// Read the renderer's project
    ///
    /// # Errors
    /// See [`BridgeServer::create_blocks`].
    pub async fn read_project(&self, session_id: &str, detail_level: &str) -> Result<Value, BridgeError> {
        let command = Command::ReadProject {
            detail_level: detail_level.to_string(),
        };
        let body = self.request(session_id, &command).await?;
        Ok(body.get("project").cloned().unwrap_or(body))
    }

    /// # Errors
    /// See [`BridgeServer::create_blocks`].
    pub async fn execute_script(
        &self,
        session_id: &str,
        code: &str,
        sandbox: bool,
    ) -> Result<Value, BridgeError> {
        let command = Command::ExecuteScript {
            code: code.to_string(),
            sandbox,
        };
        self.request(session_id, &command).await
    }

    /// # Errors
    /// See [`BridgeServer::create_blocks`].
    pub async fn inspect_state(&self, session_id: &str, query: Value) -> Result<Value, BridgeError> {
        self.request(session_id, &Command::InspectState { query }).await
    }

    /// # Errors
    /// See [`BridgeServer::create_blocks`].
    pub async fn delete_blocks(
        &self,
        session_id: &str,
        target_sprite: &str,
        selection: Value,
    ) -> Result<Value, BridgeError> {
        let command = Command::DeleteBlocks {
            target_sprite: target_sprite.to_string(),
            selection,
        };
        self.request(session_id, &command).await
    }

    /// # Errors
    /// See [`BridgeServer::create_blocks`].
    pub async fn create_custom_block(&self, session_id: &str, spec: Value) -> Result<Value, BridgeError> {
        self.request(session_id, &Command::CreateCustomBlock { spec }).await
    }

    /// # Errors
    /// See [`BridgeServer::create_blocks`].
    pub async fn highlight_blocks(
        &self,
        session_id: &str,
        block_ids: Vec<String>,
        duration_ms: u64,
        tooltip: Option<&str>,
    ) -> Result<Value, BridgeError> {
        let command = Command::HighlightBlocks {
            block_ids,
            duration_ms,
            tooltip: tooltip.map(str::to_string),
        };
        self.request(session_id, &command).await
    }

    /// # Errors
    /// See [`BridgeServer::create_blocks`].
    pub async fn export_project(
        &self,
        session_id: &str,
        format: &str,
        include_media: bool,
    ) -> Result<Value, BridgeError> {
        let command = Command::ExportProject {
            format: format.to_string(),
            include_media,
        };
        self.request(session_id, &command).await
    }

    /// Whether the renderer reports itself ready; any failure means no
    pub async fn check_ready(&self, session_id: &str) -> bool {
        match self.send_command(session_id, &Command::snap_ready()).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "readiness probe failed");
                false
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            total_connections: self.counters.connections.load(Ordering::Relaxed),
            total_messages: self.counters.messages.load(Ordering::Relaxed),
            total_commands: self.counters.commands.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            active_connections: self.registry.len(),
            pending_responses: self.pending.len(),
        }
    }
}

/// Next text payload during the handshake, skipping control frames
async fn next_text(source: &mut WsSource) -> Result<String, ProtocolError> {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => return Ok(text),
            Ok(Message::Binary(bytes)) => {
                return String::from_utf8(bytes)
                    .map_err(|_| ProtocolError::Malformed("binary frame is not UTF-8".to_string()))
            }
            Ok(Message::Close(_)) | Err(_) => return Err(ProtocolError::Closed),
            Ok(_) => {}
        }
    }
    Err(ProtocolError::Closed)
}

async fn reject(sink: &mut WsSink, error: &ProtocolError) {
    if let Ok(message) = ServerMessage::connect_error(error).to_message() {
        let _ = sink.send(message).await;
    }
    let _ = sink.send(close_frame(error.close_code(), &error.to_string())).await;
}
