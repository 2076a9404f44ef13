//! Block knowledge base
//!
//! Loaded once at startup and read-only afterwards. Holds:
//! - the opcode catalog grouped by category (the allowlist)
//! - named block patterns with their trigger words
//! - a derived trigger-word -> pattern map that keeps declaration order
//!
//! Document format:
//!
//! ```json
//! {
//!   "blocks":   { "<category>": { "<opcode>": { "inputs": ["..."] } } },
//!   "patterns": { "<name>": { "triggers": ["..."], "blocks": [
//!       { "opcode": "...", "category": "...", "inputs": { } } ] } }
//! }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::Inputs;

/// Opcodes accepted as the head of a script
pub const EVENT_HAT_OPCODES: [&str; 7] = [
    "whenGreenFlag",
    "whenClicked",
    "whenKeyPressed",
    "receiveGo",
    "receiveClick",
    "receiveKey",
    "whenIReceive",
];

/// Whether an opcode is an event hat
#[inline]
#[must_use]
pub fn is_event_hat(opcode: &str) -> bool {
    EVENT_HAT_OPCODES.contains(&opcode)
}

const BUILTIN_DOCUMENT: &str = include_str!("../data/default_knowledge.json");

/// Catalog entry for one opcode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpcodeSpec {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One block of a pattern, before ids are assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub opcode: String,
    pub category: String,
    #[serde(default)]
    pub inputs: Inputs,
}

/// A named, reusable block sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    pub blocks: Vec<BlockTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KnowledgeDocument {
    #[serde(default)]
    blocks: IndexMap<String, IndexMap<String, OpcodeSpec>>,
    #[serde(default)]
    patterns: IndexMap<String, PatternDef>,
}

/// Read-only block knowledge
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    document: KnowledgeDocument,
    categories_by_opcode: IndexMap<String, String>,
    trigger_map: IndexMap<String, String>,
}

impl KnowledgeBase {
    /// The knowledge base compiled into the binary
    ///
    /// # Errors
    /// Returns error only if the embedded document is inconsistent.
    pub fn builtin() -> Result<Self, KnowledgeError> {
        Self::from_json_str(BUILTIN_DOCUMENT)
    }

    /// Load a knowledge document from disk
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or is inconsistent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and index a knowledge document
    ///
    /// # Errors
    /// Returns error if the JSON is malformed, an opcode appears in two
    /// categories, or a pattern uses an opcode outside the catalog.
    pub fn from_json_str(text: &str) -> Result<Self, KnowledgeError> {
        let document: KnowledgeDocument = serde_json::from_str(text)?;

        let mut categories_by_opcode = IndexMap::new();
        for (category, opcodes) in &document.blocks {
            for opcode in opcodes.keys() {
                if let Some(existing) =
                    categories_by_opcode.insert(opcode.clone(), category.clone())
                {
                    return Err(KnowledgeError::DuplicateOpcode {
                        opcode: opcode.clone(),
                        first: existing,
                        second: category.clone(),
                    });
                }
            }
        }

        let mut trigger_map = IndexMap::new();
        for (name, pattern) in &document.patterns {
            for template in &pattern.blocks {
                match categories_by_opcode.get(&template.opcode) {
                    None => {
                        return Err(KnowledgeError::UnknownPatternOpcode {
                            pattern: name.clone(),
                            opcode: template.opcode.clone(),
                        })
                    }
                    Some(category) if *category != template.category => {
                        return Err(KnowledgeError::PatternCategoryMismatch {
                            pattern: name.clone(),
                            opcode: template.opcode.clone(),
                            expected: category.clone(),
                            actual: template.category.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
            // first pattern to claim a word keeps it
            trigger_map
                .entry(name.to_lowercase())
                .or_insert_with(|| name.clone());
            for word in &pattern.triggers {
                trigger_map
                    .entry(word.to_lowercase())
                    .or_insert_with(|| name.clone());
            }
        }

        Ok(Self {
            document,
            categories_by_opcode,
            trigger_map,
        })
    }

    /// Category an opcode belongs to
    #[inline]
    #[must_use]
    pub fn category_of(&self, opcode: &str) -> Option<&str> {
        self.categories_by_opcode.get(opcode).map(String::as_str)
    }

    /// Whether the opcode is in the allowlist
    #[inline]
    #[must_use]
    pub fn is_allowed(&self, opcode: &str) -> bool {
        self.categories_by_opcode.contains_key(opcode)
    }

    /// Number of catalogued opcodes
    #[inline]
    #[must_use]
    pub fn opcode_count(&self) -> usize {
        self.categories_by_opcode.len()
    }

    /// Categories with their opcodes, in document order
    pub fn categories(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.document
            .blocks
            .iter()
            .map(|(cat, ops)| (cat.as_str(), ops.keys().map(String::as_str).collect()))
    }

    /// Catalog entry for an opcode
    #[must_use]
    pub fn opcode(&self, opcode: &str) -> Option<&OpcodeSpec> {
        let category = self.categories_by_opcode.get(opcode)?;
        self.document.blocks.get(category)?.get(opcode)
    }

    /// Pattern by name
    #[inline]
    #[must_use]
    pub fn pattern(&self, name: &str) -> Option<&PatternDef> {
        self.document.patterns.get(name)
    }

    /// Pattern names in declaration order
    pub fn pattern_names(&self) -> impl Iterator<Item = &str> {
        self.document.patterns.keys().map(String::as_str)
    }

    /// Trigger word -> pattern name, in declaration order
    #[inline]
    #[must_use]
    pub fn trigger_map(&self) -> &IndexMap<String, String> {
        &self.trigger_map
    }
}

/// Knowledge base loading errors
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    /// File could not be read
    #[error("cannot read knowledge base {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid JSON of the expected shape
    #[error("malformed knowledge base: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Opcode listed under two categories
    #[error("opcode '{opcode}' listed in both '{first}' and '{second}'")]
    DuplicateOpcode {
        opcode: String,
        first: String,
        second: String,
    },

    /// Pattern references an opcode outside the catalog
    #[error("pattern '{pattern}' uses unknown opcode '{opcode}'")]
    UnknownPatternOpcode { pattern: String, opcode: String },

    /// Pattern block declares the wrong category
    #[error("pattern '{pattern}': opcode '{opcode}' must have category '{expected}', but got '{actual}'")]
    PatternCategoryMismatch {
        pattern: String,
        opcode: String,
        expected: String,
        actual: String,
    },
}
