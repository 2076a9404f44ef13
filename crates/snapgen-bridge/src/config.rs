//! Bridge configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Listener and protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Time a new socket has to send its `connect` message
    pub handshake_timeout_secs: u64,
    /// Default wait for a command response
    pub command_timeout_ms: u64,
    /// Interval between server pings
    pub heartbeat_interval_secs: u64,
    /// Silence tolerated past one heartbeat interval before dropping a peer
    pub heartbeat_timeout_secs: u64,
    pub max_message_size: usize,
    /// Keep-alive interval advertised to the renderer
    pub keep_alive_interval_ms: u64,
    pub protocol_version: String,
    /// Outbound frames buffered per connection
    pub outbound_queue: usize,
}

impl BridgeConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With listen address
    #[inline]
    #[must_use]
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// With default command timeout
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With handshake timeout
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, secs: u64) -> Self {
        self.handshake_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public URL of the listener
    #[must_use]
    pub fn websocket_url(&self) -> String {
        format!("ws://{}", self.address())
    }

    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
            handshake_timeout_secs: 10,
            command_timeout_ms: 5000,
            heartbeat_interval_secs: 20,
            heartbeat_timeout_secs: 10,
            max_message_size: 1 << 20,
            keep_alive_interval_ms: 30_000,
            protocol_version: "1.0.0".to_string(),
            outbound_queue: 32,
        }
    }
}
