//! Session authority
//!
//! Issues sessions, validates display tokens presented by the renderer and
//! tracks connection state. The in-memory map answers first; every change is
//! written through to the store after the map lock is released, and a lookup
//! that misses re-reads the store for sessions issued elsewhere. Sessions
//! removed by [`SessionAuthority::purge_expired`] are gone for good;
//! connection updates for them fail with `UnknownSession`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{ConnectionStatus, SessionGrant, SessionRecord};
use crate::store::{JsonFileStore, MemoryStore, SessionStore};
use crate::token::{display_code, SessionToken, TokenSigner};

/// Owner of all sessions
#[derive(Debug)]
pub struct SessionAuthority {
    config: SessionConfig,
    signer: TokenSigner,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    store: Arc<dyn SessionStore>,
}

impl SessionAuthority {
    /// Create an authority over `store`, loading what it holds
    ///
    /// # Errors
    /// Returns error if the secret is empty or the store cannot be read.
    pub fn new(config: SessionConfig, store: Arc<dyn SessionStore>) -> Result<Self, SessionError> {
        let signer = TokenSigner::new(config.secret_key.as_bytes())?;
        let loaded = store.load_all()?;
        let now = Utc::now();
        let expired = loaded.iter().filter(|s| s.is_expired_at(now)).count();
        tracing::info!(sessions = loaded.len(), expired, "loaded sessions");

        Ok(Self {
            sessions: RwLock::new(
                loaded
                    .into_iter()
                    .map(|s| (s.session_id.clone(), s))
                    .collect(),
            ),
            config,
            signer,
            store,
        })
    }

    /// Create an authority with the store named by the config
    ///
    /// # Errors
    /// See [`SessionAuthority::new`].
    pub fn from_config(config: SessionConfig) -> Result<Self, SessionError> {
        let store: Arc<dyn SessionStore> = match &config.store_path {
            Some(path) => Arc::new(JsonFileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Self::new(config, store)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issue a new session for `user_id`
    ///
    /// # Errors
    /// Returns error if the session cannot be persisted.
    pub fn start_session(&self, user_id: &str) -> Result<SessionGrant, SessionError> {
        self.start_session_at(user_id, Utc::now())
    }

    /// [`start_session`](Self::start_session) with an explicit clock
    ///
    /// # Errors
    /// Returns error if the session cannot be persisted.
    pub fn start_session_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionGrant, SessionError> {
        let session_id = format!("sess_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let token_id = format!("{}{}", self.config.token_prefix, Uuid::new_v4());
        let token = self.signer.sign(
            token_id.clone(),
            session_id.clone(),
            now,
            now + Duration::minutes(self.config.validity_minutes),
            self.config.permissions.clone(),
        )?;
        let record = SessionRecord {
            display_token: display_code(&token_id, self.config.display_length),
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            token,
            created_at: now,
            connected: false,
            connected_at: None,
            last_activity: None,
        };

        let grant = SessionGrant {
            session_id: session_id.clone(),
            user_id: record.user_id.clone(),
            token_id,
            display_token: record.display_token.clone(),
            expires_at: record.expires_at(),
            websocket_url: self.config.websocket_url.clone(),
        };
        self.sessions
            .write()
            .insert(session_id.clone(), record.clone());
        if let Err(e) = self.store.upsert(&record) {
            self.sessions.write().remove(&session_id);
            return Err(e.into());
        }

        tracing::info!(%session_id, user_id, expires_at = %grant.expires_at, "session started");
        Ok(grant)
    }

    /// Resolve a display token to its session id
    ///
    /// # Errors
    /// `NotFound` for unknown tokens, `InvalidSignature` for tampered
    /// records, `NotYetValid` before the token's issue time, `Expired` once
    /// the validity window has passed.
    pub fn validate(&self, display_token: &str) -> Result<String, SessionError> {
        self.validate_at(display_token, Utc::now())
    }

    /// [`validate`](Self::validate) with an explicit clock
    ///
    /// # Errors
    /// See [`SessionAuthority::validate`].
    pub fn validate_at(
        &self,
        display_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let wanted = display_token.trim().to_uppercase();
        if wanted.is_empty() {
            return Err(SessionError::NotFound);
        }

        let record = match self.find_display(&wanted) {
            Some(record) => record,
            None => {
                self.refresh()?;
                self.find_display(&wanted).ok_or(SessionError::NotFound)?
            }
        };

        if !self.signer.verify(&record.token) {
            tracing::warn!(session_id = %record.session_id, "stored token failed verification");
            return Err(SessionError::InvalidSignature {
                session_id: record.session_id,
            });
        }
        if now < record.token.issued_at {
            return Err(SessionError::NotYetValid);
        }
        if record.is_expired_at(now) {
            return Err(SessionError::Expired);
        }
        Ok(record.session_id)
    }

    fn find_display(&self, wanted: &str) -> Option<SessionRecord> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.display_token == wanted)
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    /// Merge sessions the store holds but this authority has not seen
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub fn refresh(&self) -> Result<usize, SessionError> {
        let stored = self.store.load_all()?;
        let mut sessions = self.sessions.write();
        let mut added = 0;
        for record in stored {
            if !sessions.contains_key(&record.session_id) {
                sessions.insert(record.session_id.clone(), record);
                added += 1;
            }
        }
        drop(sessions);
        if added > 0 {
            tracing::debug!(added, "picked up sessions from the store");
        }
        Ok(added)
    }

    /// Check a full token against this authority's key
    #[must_use]
    pub fn verify_token(&self, token: &SessionToken) -> bool {
        self.signer.verify(token)
    }

    /// Record that the renderer connected; repeat calls are no-ops
    ///
    /// # Errors
    /// `UnknownSession` if the session does not exist, or a store error.
    pub fn mark_connected(&self, session_id: &str) -> Result<(), SessionError> {
        self.stage_connected(session_id)?.persist()
    }

    /// Apply a connection in memory and hand back the store write
    ///
    /// # Errors
    /// `UnknownSession` if the session does not exist.
    pub fn stage_connected(&self, session_id: &str) -> Result<PendingWrite, SessionError> {
        self.stage(session_id, |record, now| {
            if !record.connected {
                record.connected = true;
                record.connected_at = Some(now);
            }
            record.last_activity = Some(now);
        })
    }

    /// Record that the renderer went away; repeat calls are no-ops
    ///
    /// # Errors
    /// `UnknownSession` if the session does not exist, or a store error.
    pub fn mark_disconnected(&self, session_id: &str) -> Result<(), SessionError> {
        self.stage_disconnected(session_id)?.persist()
    }

    /// Apply a disconnection in memory and hand back the store write
    ///
    /// # Errors
    /// `UnknownSession` if the session does not exist.
    pub fn stage_disconnected(&self, session_id: &str) -> Result<PendingWrite, SessionError> {
        self.stage(session_id, |record, now| {
            record.connected = false;
            record.last_activity = Some(now);
        })
    }

    fn stage(
        &self,
        session_id: &str,
        apply: impl FnOnce(&mut SessionRecord, DateTime<Utc>),
    ) -> Result<PendingWrite, SessionError> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        apply(record, Utc::now());
        Ok(PendingWrite {
            store: Arc::clone(&self.store),
            record: record.clone(),
        })
    }

    /// Connection state of a session
    ///
    /// # Errors
    /// `UnknownSession` if the session does not exist.
    pub fn check_connection(&self, session_id: &str) -> Result<ConnectionStatus, SessionError> {
        self.get(session_id)
            .map(|s| s.status_at(Utc::now()))
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    /// Session by id, re-reading the store on a miss
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        if let Some(record) = self.sessions.read().get(session_id) {
            return Some(record.clone());
        }
        if let Err(e) = self.refresh() {
            tracing::warn!(%session_id, error = %e, "session store unreadable");
        }
        self.sessions.read().get(session_id).cloned()
    }

    /// Newest live session, preferring connected ones
    #[must_use]
    pub fn most_recent(&self) -> Option<String> {
        let now = Utc::now();
        self.sessions
            .read()
            .values()
            .filter(|s| !s.is_expired_at(now))
            .max_by_key(|s| (s.connected, s.created_at))
            .map(|s| s.session_id.clone())
    }

    /// Sessions currently held
    #[must_use]
    pub fn list(&self) -> Vec<SessionRecord> {
        let mut all: Vec<_> = self.sessions.read().values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    /// Drop every expired session here and in the store
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        self.purge_expired_at(Utc::now())
    }

    /// [`purge_expired`](Self::purge_expired) with an explicit clock
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.session_id.clone())
            .collect();
        for session_id in &expired {
            sessions.remove(session_id);
        }
        let remaining = sessions.len();
        drop(sessions);

        // per-id removal leaves records other writers added untouched
        for session_id in &expired {
            self.store.remove(session_id)?;
        }
        if !expired.is_empty() {
            tracing::info!(removed = expired.len(), remaining, "purged expired sessions");
        }
        Ok(expired.len())
    }
}

/// A session change already applied in memory, not yet in the store
///
/// [`persist`](Self::persist) does blocking I/O; async callers run it on a
/// blocking thread.
#[derive(Debug)]
#[must_use = "the change is not stored until `persist` runs"]
pub struct PendingWrite {
    store: Arc<dyn SessionStore>,
    record: SessionRecord,
}

impl PendingWrite {
    #[must_use]
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// Write the record through to the store
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    pub fn persist(self) -> Result<(), SessionError> {
        self.store.upsert(&self.record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> SessionAuthority {
        SessionAuthority::new(
            SessionConfig::new().with_secret("unit-secret"),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn issued_session_validates() {
        let auth = authority();
        let grant = auth.start_session("ada").unwrap();
        assert!(grant.session_id.starts_with("sess_"));
        assert_eq!(grant.session_id.len(), 17);
        assert!(grant.token_id.starts_with("snap-mcp-"));
        assert_eq!(grant.display_token.len(), 8);
        assert_eq!(
            grant.display_token,
            grant.display_token.to_uppercase()
        );
        assert_eq!(auth.validate(&grant.display_token).unwrap(), grant.session_id);
        // lower-case and padded input is accepted
        let typed = format!("  {} ", grant.display_token.to_lowercase());
        assert_eq!(auth.validate(&typed).unwrap(), grant.session_id);
    }

    #[test]
    fn unknown_token_not_found() {
        let auth = authority();
        let err = auth.validate("ZZZZZZZZ").unwrap_err();
        assert_eq!(err.to_string(), "Session not found for this token.");
        assert!(matches!(auth.validate(""), Err(SessionError::NotFound)));
    }

    #[test]
    fn expiry_boundary() {
        let auth = authority();
        let start = Utc::now();
        let grant = auth.start_session_at("ada", start).unwrap();
        let end = start + Duration::minutes(30);

        assert!(auth
            .validate_at(&grant.display_token, end - Duration::seconds(1))
            .is_ok());
        let err = auth.validate_at(&grant.display_token, end).unwrap_err();
        assert_eq!(err.to_string(), "Token has expired.");
    }

    #[test]
    fn not_valid_before_issue() {
        let auth = authority();
        let start = Utc::now();
        let grant = auth.start_session_at("ada", start).unwrap();

        assert!(auth.validate_at(&grant.display_token, start).is_ok());
        let err = auth
            .validate_at(&grant.display_token, start - Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, SessionError::NotYetValid));
        assert!(err.needs_new_token());
    }

    #[test]
    fn staged_change_is_visible_before_it_is_stored() {
        let store = Arc::new(MemoryStore::new());
        let auth = SessionAuthority::new(
            SessionConfig::new().with_secret("unit-secret"),
            store.clone(),
        )
        .unwrap();
        let grant = auth.start_session("ada").unwrap();

        let write = auth.stage_connected(&grant.session_id).unwrap();
        assert!(auth.check_connection(&grant.session_id).unwrap().connected);
        assert!(!store.load_all().unwrap()[0].connected);

        assert!(write.record().connected);
        write.persist().unwrap();
        assert!(store.load_all().unwrap()[0].connected);
    }

    #[test]
    fn connection_tracking_is_idempotent() {
        let auth = authority();
        let grant = auth.start_session("ada").unwrap();
        assert!(!auth.check_connection(&grant.session_id).unwrap().connected);

        auth.mark_connected(&grant.session_id).unwrap();
        let first = auth.check_connection(&grant.session_id).unwrap().connected_at;
        auth.mark_connected(&grant.session_id).unwrap();
        let status = auth.check_connection(&grant.session_id).unwrap();
        assert!(status.connected);
        assert_eq!(status.connected_at, first);

        auth.mark_disconnected(&grant.session_id).unwrap();
        auth.mark_disconnected(&grant.session_id).unwrap();
        assert!(!auth.check_connection(&grant.session_id).unwrap().connected);
    }

    #[test]
    fn purged_sessions_stay_gone() {
        let auth = authority();
        let old = auth
            .start_session_at("ada", Utc::now() - Duration::hours(2))
            .unwrap();
        let fresh = auth.start_session("bob").unwrap();

        assert_eq!(auth.purge_expired().unwrap(), 1);
        assert!(auth.get(&old.session_id).is_none());
        assert!(matches!(
            auth.mark_disconnected(&old.session_id),
            Err(SessionError::UnknownSession(_))
        ));
        assert!(auth.get(&old.session_id).is_none());
        assert_eq!(auth.most_recent(), Some(fresh.session_id));
    }

    #[test]
    fn most_recent_prefers_connected() {
        let auth = authority();
        let start = Utc::now();
        let a = auth.start_session_at("ada", start).unwrap();
        let _b = auth
            .start_session_at("bob", start + Duration::seconds(5))
            .unwrap();
        auth.mark_connected(&a.session_id).unwrap();
        assert_eq!(auth.most_recent(), Some(a.session_id));
    }

    #[test]
    fn empty_secret_refused() {
        let err = SessionAuthority::new(SessionConfig::new(), Arc::new(MemoryStore::new()))
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingSecret));
    }
}
