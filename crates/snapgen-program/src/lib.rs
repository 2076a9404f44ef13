//! snapgen program model
//!
//! Shared vocabulary for every snapgen crate.
//!
//! # Core Concepts
//!
//! - [`Intent`]: structured reading of one request clause
//! - [`Block`], [`Script`], [`GeneratedProgram`]: the `create_blocks` wire model
//! - [`KnowledgeBase`]: opcode allowlist, categories and named patterns
//! - [`RequestKey`]: Blake3 fingerprint used by the result cache
//! - [`ErrorKind`], [`Diagnostic`]: error taxonomy shared by all crates
//!
//! # Example
//!
//! ```rust,ignore
//! use snapgen_program::{KnowledgeBase, ScriptBuilder, GeneratedProgram};
//!
//! let kb = KnowledgeBase::builtin()?;
//! let script = ScriptBuilder::new("script_001")
//!     .hat("whenGreenFlag", "control", Default::default())
//!     .push("forward", "motion", Default::default())
//!     .build();
//! let program = GeneratedProgram::new("Sprite", vec![script]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod block;
mod diagnostic;
mod hash;
mod intent;
mod knowledge;

pub use block::{
    truncate_chars, Block, GeneratedProgram, Inputs, Position, ProgramPayload, Script,
    ScriptBuilder, CREATE_BLOCKS_COMMAND, DEFAULT_TARGET,
};
pub use diagnostic::{Diagnostic, ErrorKind, Suggestion};
pub use hash::{normalize_request, KeyError, RequestKey};
pub use intent::{Intent, Subject};
pub use knowledge::{
    is_event_hat, BlockTemplate, KnowledgeBase, KnowledgeError, OpcodeSpec, PatternDef,
    EVENT_HAT_OPCODES,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Block, GeneratedProgram, Intent, KnowledgeBase, RequestKey, Script, ScriptBuilder,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
