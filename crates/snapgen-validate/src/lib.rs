//! snapgen validator
//!
//! Checks that a generated program is structurally sound before it is
//! cached or shipped to the renderer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use snapgen_program::KnowledgeBase;
//! use snapgen_validate::ProgramValidator;
//!
//! let validator = ProgramValidator::new(Arc::new(KnowledgeBase::builtin()?));
//! let program = validator.validate_value(&raw_json)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod shape;
mod validator;

pub use error::ValidationError;
pub use validator::ProgramValidator;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
