//! snapgen service
//!
//! The user-facing operations on top of generation, sessions and the bridge.
//!
//! # Core Concepts
//!
//! - [`ServiceConfig`]: one TOML document plus environment secrets
//! - [`SnapService`]: start sessions, check connections, generate and deliver
//!   programs, inspect projects, define custom blocks
//! - [`Outcome`]: success flag with a result, an error, or both
//! - [`AdminServer`]: loopback endpoint through which other processes ask
//!   the serving process for sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use snapgen_service::{GenerateRequest, ServiceConfig, SnapService};
//!
//! let config = ServiceConfig::load("snapgen.toml")?.resolve_from_env();
//! let service = SnapService::from_config(&config)?;
//! let session = service.start_session("ada");
//! let outcome = service.generate_blocks(&GenerateRequest::new("spin forever")).await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod admin;
mod config;
mod error;
mod outcome;
mod service;

pub use admin::{admin_request, AdminConfig, AdminRequest, AdminServer, SessionSummary};
pub use config::{ServiceConfig, API_KEY_ENV};
pub use error::ServiceError;
pub use outcome::{ErrorBody, Outcome};
pub use service::{
    BlockParameter, ConnectionReport, CustomBlockReport, CustomBlockRequest, ExecutionMode,
    GenerateReport, GenerateRequest, ProjectReport, SessionStarted, SnapService,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
