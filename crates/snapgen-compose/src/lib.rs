//! snapgen program composition
//!
//! Natural-language request -> validated block program.
//!
//! # Core Concepts
//!
//! - [`IntentExtractor`]: rule-based clause splitting and intent extraction
//! - [`PatternMatcher`]: action -> knowledge-base pattern, exact then fuzzy
//! - [`GenerativeEngine`]: prompt, backend call, JSON extraction, validation
//! - [`ProgramCache`]: bounded LRU of successful programs
//! - [`ProgramGenerator`]: the pipeline tying the above together
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use snapgen_compose::{GenerationOptions, HttpBackend, ProgramGenerator};
//!
//! let generator = ProgramGenerator::new(kb, Arc::new(HttpBackend::new(cfg.clone())?), cfg, cache)?;
//! let outcome = generator.generate("turn right 90 degrees", &GenerationOptions::default()).await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod backend;
mod cache;
mod config;
mod engine;
mod error;
mod extractor;
mod matcher;
mod metrics;
mod pipeline;
mod prompt;
mod quota;

pub use backend::{extract_json, BackendRequest, GenerativeBackend, HttpBackend};
pub use cache::{CacheStats, ProgramCache};
pub use config::{CacheConfig, Complexity, GenerationConfig, GenerationOptions};
pub use engine::GenerativeEngine;
pub use error::{ComposeError, GenerativeError, IntentError};
pub use extractor::{IntentExtractor, TriggerMatch};
pub use matcher::{similarity, PatternMatch, PatternMatcher};
pub use metrics::{GenerationMetrics, MetricsSnapshot};
pub use pipeline::{Generation, GenerationPath, ProgramGenerator};
pub use prompt::{select_tier, ModelTier, PromptBuilder};
pub use quota::DailyQuota;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
