//! snapgen sessions
//!
//! Short-lived, signed credentials that let a renderer attach to the bridge.
//!
//! # Core Concepts
//!
//! - [`TokenSigner`]: HMAC-SHA256 signing of [`SessionToken`]s
//! - [`SessionAuthority`]: issue, validate, track and purge sessions
//! - [`SessionStore`]: persistence seam; [`JsonFileStore`] and [`MemoryStore`]
//!
//! # Example
//!
//! ```rust,ignore
//! use snapgen_session::{SessionAuthority, SessionConfig};
//!
//! let authority = SessionAuthority::from_config(SessionConfig::new().with_secret(secret))?;
//! let grant = authority.start_session("ada")?;
//! let session_id = authority.validate(&grant.display_token)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod authority;
mod config;
mod error;
mod session;
mod store;
mod token;

pub use authority::{PendingWrite, SessionAuthority};
pub use config::{SessionConfig, SECRET_KEY_ENV};
pub use error::{SessionError, StoreError};
pub use session::{ConnectionStatus, SessionGrant, SessionRecord};
pub use store::{JsonFileStore, MemoryStore, SessionStore};
pub use token::{display_code, SessionToken, TokenSigner, DEFAULT_PERMISSIONS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
