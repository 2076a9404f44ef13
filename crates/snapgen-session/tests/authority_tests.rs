//! Session authority behavior across restarts and tampering

use std::sync::Arc;

use chrono::{Duration, Utc};
use snapgen_session::{
    JsonFileStore, SessionAuthority, SessionConfig, SessionError, SessionStore,
};

fn config(path: &std::path::Path) -> SessionConfig {
    SessionConfig::new()
        .with_secret("integration-secret")
        .with_store_path(path)
}

/// Sessions written by one authority are honored by the next
#[test]
fn test_sessions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let grant = {
        let auth = SessionAuthority::from_config(config(&path)).unwrap();
        let grant = auth.start_session("ada").unwrap();
        auth.mark_connected(&grant.session_id).unwrap();
        grant
    };

    let auth = SessionAuthority::from_config(config(&path)).unwrap();
    assert_eq!(auth.validate(&grant.display_token).unwrap(), grant.session_id);
    let status = auth.check_connection(&grant.session_id).unwrap();
    assert!(status.connected);
    assert!(!status.expired);
}

/// A different secret cannot vouch for stored tokens
#[test]
fn test_rotated_secret_invalidates_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let grant = SessionAuthority::from_config(config(&path))
        .unwrap()
        .start_session("ada")
        .unwrap();

    let rotated = SessionAuthority::from_config(config(&path).with_secret("rotated")).unwrap();
    let err = rotated.validate(&grant.display_token).unwrap_err();
    assert!(matches!(err, SessionError::InvalidSignature { .. }));
    assert!(err.needs_new_token());
}

/// Editing the session file by hand breaks the signature
#[test]
fn test_tampered_expiry_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let grant = SessionAuthority::from_config(config(&path))
        .unwrap()
        .start_session("ada")
        .unwrap();

    let store = JsonFileStore::new(&path);
    let mut records = store.load_all().unwrap();
    records[0].token.expires_at = Utc::now() + Duration::days(365);
    store.save_all(&records).unwrap();

    let auth = SessionAuthority::from_config(config(&path)).unwrap();
    assert!(matches!(
        auth.validate(&grant.display_token),
        Err(SessionError::InvalidSignature { .. })
    ));
}

/// Purging rewrites the file without the expired entries
#[test]
fn test_purge_rewrites_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    let store: Arc<dyn SessionStore> = Arc::new(JsonFileStore::new(&path));

    let auth = SessionAuthority::new(config(&path), store.clone()).unwrap();
    auth.start_session_at("old", Utc::now() - Duration::hours(1))
        .unwrap();
    let live = auth.start_session("new").unwrap();
    assert_eq!(store.load_all().unwrap().len(), 2);

    assert_eq!(auth.purge_expired().unwrap(), 1);
    let left = store.load_all().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].session_id, live.session_id);
    assert_eq!(auth.purge_expired().unwrap(), 0);
}

/// Grants carry the renderer address and usable instructions
#[test]
fn test_grant_instructions_mention_code() {
    let auth = SessionAuthority::new(
        SessionConfig::new().with_secret("s"),
        Arc::new(snapgen_session::MemoryStore::new()),
    )
    .unwrap();
    let grant = auth.start_session("ada").unwrap();
    assert_eq!(grant.websocket_url, "ws://localhost:8765");
    assert!(grant
        .instructions()
        .iter()
        .any(|line| line.contains(&grant.display_token)));
}

/// A running authority sees sessions another authority wrote to the same
/// file, and purging its own expired sessions leaves them on disk
#[test]
fn test_shared_file_between_authorities() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let server = SessionAuthority::from_config(config(&path)).unwrap();
    let stale = server
        .start_session_at("old", Utc::now() - Duration::hours(2))
        .unwrap();

    let other = SessionAuthority::from_config(config(&path)).unwrap();
    let grant = other.start_session("ada").unwrap();

    assert_eq!(server.validate(&grant.display_token).unwrap(), grant.session_id);
    assert_eq!(server.purge_expired().unwrap(), 1);

    let on_disk: Vec<String> = JsonFileStore::new(&path)
        .load_all()
        .unwrap()
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(on_disk, vec![grant.session_id.clone()]);
    assert!(server.get(&stale.session_id).is_none());
}

/// Concurrent writers through one authority never lose each other's sessions
#[test]
fn test_concurrent_sessions_all_stored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    let auth = Arc::new(SessionAuthority::from_config(config(&path)).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let auth = Arc::clone(&auth);
            std::thread::spawn(move || {
                let grant = auth.start_session(&format!("user{i}")).unwrap();
                auth.mark_connected(&grant.session_id).unwrap();
                grant.session_id
            })
        })
        .collect();
    let mut issued: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    issued.sort();

    let stored = JsonFileStore::new(&path).load_all().unwrap();
    let mut ids: Vec<String> = stored.iter().map(|s| s.session_id.clone()).collect();
    ids.sort();
    assert_eq!(ids, issued);
    assert!(stored.iter().all(|s| s.connected));
}
