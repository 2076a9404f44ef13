//! Testing utilities for the snapgen workspace
//!
//! Shared test helpers, fixtures, and a scripted renderer client.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use snapgen_compose::{
    BackendRequest, CacheConfig, GenerationConfig, GenerativeBackend, GenerativeError,
    ProgramGenerator,
};
use snapgen_program::{GeneratedProgram, Inputs, KnowledgeBase, ScriptBuilder};
use snapgen_session::{MemoryStore, SessionAuthority, SessionConfig};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const TEST_SECRET: &str = "snapgen-test-secret";

/// Backend that replays queued replies and counts calls
///
/// Once the queue is empty every call returns the fallback reply.
#[derive(Debug)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, GenerativeError>>>,
    fallback: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    /// Backend that always answers `reply`
    #[must_use]
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply.into(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue one reply ahead of the fallback
    #[must_use]
    pub fn then(self, reply: Result<String, GenerativeError>) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<BackendRequest> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<String, GenerativeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn knowledge_base() -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::builtin().unwrap())
}

/// Green-flag hat followed by `turn 15` and `forward 10`
pub fn simple_program() -> GeneratedProgram {
    let script = ScriptBuilder::new("script_001")
        .hat("whenGreenFlag", "control", Inputs::new())
        .push("turn", "motion", inputs(&[("DEGREES", json!(15))]))
        .push("forward", "motion", inputs(&[("STEPS", json!(10))]))
        .build();
    GeneratedProgram::new("Sprite", vec![script])
}

/// [`simple_program`] as model output, wrapped in a code fence
pub fn fenced_program_reply() -> String {
    let body = serde_json::to_string_pretty(&simple_program()).unwrap();
    format!("Here you go:\n```json\n{body}\n```")
}

pub fn inputs(pairs: &[(&str, Value)]) -> Inputs {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn setup_generator(backend: Arc<ScriptedBackend>) -> ProgramGenerator {
    setup_generator_with(backend, GenerationConfig::default())
}

pub fn setup_generator_with(
    backend: Arc<ScriptedBackend>,
    config: GenerationConfig,
) -> ProgramGenerator {
    ProgramGenerator::new(knowledge_base(), backend, config, CacheConfig::default()).unwrap()
}

pub fn memory_authority() -> Arc<SessionAuthority> {
    Arc::new(
        SessionAuthority::new(
            SessionConfig::new().with_secret(TEST_SECRET),
            Arc::new(MemoryStore::new()),
        )
        .unwrap(),
    )
}

pub type RendererSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Minimal renderer side of the bridge protocol
pub struct RendererClient {
    socket: RendererSocket,
}

impl RendererClient {
    /// Open a socket without sending anything
    pub async fn open(url: &str) -> Self {
        let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        Self { socket }
    }

    /// Open a socket and perform the connect handshake
    ///
    /// Returns the client and the server's first reply.
    pub async fn connect(url: &str, token: &str) -> (Self, Value) {
        let mut client = Self::open(url).await;
        client
            .send_json(&json!({
                "type": "connect",
                "token": token,
                "client_info": {"snap_version": "9.0", "user_agent": "test"}
            }))
            .await;
        let reply = client.recv_json().await;
        (client, reply)
    }

    pub async fn send_json(&mut self, value: &Value) {
        self.socket
            .send(Message::Text(value.to_string()))
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.socket.send(message).await.unwrap();
    }

    /// Next text frame as JSON, answering pings on the way
    pub async fn recv_json(&mut self) -> Value {
        loop {
            match self.next().await {
                Some(Message::Text(text)) => return serde_json::from_str(&text).unwrap(),
                Some(Message::Ping(data)) => self.socket.send(Message::Pong(data)).await.unwrap(),
                Some(other) => panic!("expected text frame, got {other:?}"),
                None => panic!("socket closed while waiting for a message"),
            }
        }
    }

    /// Next frame of any kind; `None` once the stream ends
    pub async fn next(&mut self) -> Option<Message> {
        match self.socket.next().await {
            Some(Ok(message)) => Some(message),
            _ => None,
        }
    }

    /// Wait for the close frame and return its code
    pub async fn expect_close(&mut self) -> Option<u16> {
        while let Some(message) = self.next().await {
            if let Message::Close(frame) = message {
                return frame.map(|f| u16::from(f.code));
            }
        }
        None
    }

    /// Answer a command with a success response carrying `result`
    pub async fn respond(&mut self, command: &Value, result: Value) {
        let reply = json!({
            "type": "response",
            "message_id": format!("resp_{}", command["message_id"].as_str().unwrap_or("x")),
            "correlation_id": command["message_id"],
            "status": "success",
            "result": result,
        });
        self.send_json(&reply).await;
    }

    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}
