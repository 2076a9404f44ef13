//! Session records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::token::SessionToken;

/// One authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub token: SessionToken,
    /// Code the user types into the renderer
    pub display_token: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionRecord {
    #[inline]
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.token.expires_at
    }

    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.token.is_expired_at(now)
    }

    /// Status view at `now`
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> ConnectionStatus {
        ConnectionStatus {
            session_id: self.session_id.clone(),
            connected: self.connected,
            expired: self.is_expired_at(now),
            expires_at: self.expires_at(),
            seconds_remaining: (self.expires_at() - now).num_seconds().max(0),
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}

/// What a new session hands back to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub session_id: String,
    pub user_id: String,
    pub token_id: String,
    /// Code to enter in the renderer's connect dialog
    pub display_token: String,
    pub expires_at: DateTime<Utc>,
    pub websocket_url: String,
}

impl SessionGrant {
    /// Steps shown to the user after issuing a token
    #[must_use]
    pub fn instructions(&self) -> Vec<String> {
        vec![
            "Open Snap! in your browser with the bridge extension loaded".to_string(),
            format!("Enter the code {} in the connect dialog", self.display_token),
            format!("The bridge listens on {}", self.websocket_url),
            format!("The code expires at {}", self.expires_at.to_rfc3339()),
        ]
    }
}

/// Connection state of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub session_id: String,
    pub connected: bool,
    pub expired: bool,
    pub expires_at: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}
