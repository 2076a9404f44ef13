//! snapgen renderer bridge
//!
//! Authenticated WebSocket channel between snapgen and a Snap! renderer.
//!
//! # Core Concepts
//!
//! - [`BridgeServer`]: per-connection handshake, message loop and heartbeat
//! - [`Command`]: typed renderer commands with their wire payloads
//! - [`ConnectionRegistry`] / [`PendingResponses`]: session -> connection and
//!   correlation id -> waiting caller
//! - [`SessionGate`]: token checks and presence notifications, injected
//!
//! # Example
//!
//! ```rust,ignore
//! use snapgen_bridge::{BridgeConfig, BridgeDeps, BridgeServer};
//!
//! let server = BridgeServer::new(BridgeConfig::default(), BridgeDeps::new(authority));
//! tokio::spawn(server.clone().run());
//! let body = server.create_blocks(&session_id, &program, true).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod command;
mod config;
mod deps;
mod error;
mod protocol;
mod registry;
mod server;

pub use command::{Command, SUPPORTED_COMMANDS};
pub use config::BridgeConfig;
pub use deps::{BridgeDeps, EventHandler, LoggingEvents, SessionGate};
pub use error::{BridgeError, ProtocolError};
pub use protocol::{
    CommandFrame, CommandOptions, CommandResponse, ConnectRequest, ErrorBody, Inbound,
    RendererEvent, ServerCapabilities, ServerMessage,
};
pub use registry::{ConnectionHandle, ConnectionRegistry, PendingResponses};
pub use server::{BridgeServer, BridgeStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
