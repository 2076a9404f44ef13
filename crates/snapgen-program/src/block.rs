//! Block programs
//!
//! Wire model for generated programs:
//! - [`Block`]: one visual instruction, linked to its successor by id
//! - [`Script`]: a positioned chain of blocks headed by an event hat
//! - [`GeneratedProgram`]: the `create_blocks` envelope sent to the renderer
//! - [`ScriptBuilder`]: assembles a correctly linked script

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command tag carried by every generated program
pub const CREATE_BLOCKS_COMMAND: &str = "create_blocks";

/// Renderer entity used when the caller does not name one
pub const DEFAULT_TARGET: &str = "Sprite";

/// Named block inputs (input name -> literal value)
pub type Inputs = Map<String, Value>;

/// A single block instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    pub opcode: String,
    pub category: String,
    #[serde(default)]
    pub inputs: Inputs,
    pub is_hat_block: bool,
    #[serde(default)]
    pub next: Option<String>,
}

impl Block {
    /// Create an unlinked block
    #[must_use]
    pub fn new(
        block_id: impl Into<String>,
        opcode: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            opcode: opcode.into(),
            category: category.into(),
            inputs: Inputs::new(),
            is_hat_block: false,
            next: None,
        }
    }

    /// With inputs
    #[inline]
    #[must_use]
    pub fn with_inputs(mut self, inputs: Inputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Mark as hat block
    #[inline]
    #[must_use]
    pub fn as_hat(mut self) -> Self {
        self.is_hat_block = true;
        self
    }

    /// Point at successor
    #[inline]
    #[must_use]
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// Canvas coordinates of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    #[inline]
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(50, 50)
    }
}

/// A positioned, linked chain of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub script_id: String,
    pub position: Position,
    pub blocks: Vec<Block>,
}

impl Script {
    /// The head block, if any
    #[inline]
    #[must_use]
    pub fn head(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Find a block by id
    #[must_use]
    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_id == block_id)
    }

    /// Walk the `next` chain from the head
    ///
    /// Stops at the first missing id or revisited block.
    #[must_use]
    pub fn chain(&self) -> Vec<&Block> {
        let mut out = Vec::with_capacity(self.blocks.len());
        let mut cursor = self.head();
        while let Some(block) = cursor {
            if out.iter().any(|b: &&Block| b.block_id == block.block_id) {
                break;
            }
            out.push(block);
            cursor = block.next.as_deref().and_then(|id| self.block(id));
        }
        out
    }
}

/// Body of a `create_blocks` program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramPayload {
    pub target_sprite: String,
    pub scripts: Vec<Script>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_request: Option<String>,
}

/// A complete program ready for the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProgram {
    pub command: String,
    pub payload: ProgramPayload,
}

impl GeneratedProgram {
    /// Wrap scripts for a target entity
    #[must_use]
    pub fn new(target_sprite: impl Into<String>, scripts: Vec<Script>) -> Self {
        Self {
            command: CREATE_BLOCKS_COMMAND.to_string(),
            payload: ProgramPayload {
                target_sprite: target_sprite.into(),
                scripts,
                error: None,
                user_request: None,
            },
        }
    }

    /// Build the error-marker program shown when generation fails
    ///
    /// One script: a green-flag hat followed by a say block describing the
    /// failure. The error text and the original request are kept on the
    /// payload. This program bypasses validation and is never cached.
    #[must_use]
    pub fn error_fallback(error: &str, request: &str) -> Self {
        let message = format!(
            "Generation failed: {}... | Request: '{}'",
            truncate_chars(error, 50),
            truncate_chars(request, 30)
        );
        let mut say_inputs = Inputs::new();
        say_inputs.insert("MESSAGE".to_string(), Value::String(message));

        let script = Script {
            script_id: "error_001".to_string(),
            position: Position::default(),
            blocks: vec![
                Block::new("error_block_000", "whenGreenFlag", "control")
                    .as_hat()
                    .with_next("error_block_001"),
                Block::new("error_block_001", "doSay", "looks").with_inputs(say_inputs),
            ],
        };

        let mut program = Self::new(DEFAULT_TARGET, vec![script]);
        program.payload.error = Some(error.to_string());
        program.payload.user_request = Some(request.to_string());
        program
    }

    /// Attach the originating request text
    #[inline]
    #[must_use]
    pub fn with_user_request(mut self, request: impl Into<String>) -> Self {
        self.payload.user_request = Some(request.into());
        self
    }

    /// Whether this is an error-marker program
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.payload.error.is_some()
    }

    #[inline]
    #[must_use]
    pub fn target_sprite(&self) -> &str {
        &self.payload.target_sprite
    }

    #[inline]
    #[must_use]
    pub fn scripts(&self) -> &[Script] {
        &self.payload.scripts
    }

    /// Total blocks across all scripts
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.payload.scripts.iter().map(|s| s.blocks.len()).sum()
    }

    /// All block ids in script order
    #[must_use]
    pub fn block_ids(&self) -> Vec<String> {
        self.payload
            .scripts
            .iter()
            .flat_map(|s| s.blocks.iter().map(|b| b.block_id.clone()))
            .collect()
    }
}

/// Assembles a linked script with sequential block ids
///
/// Ids are `block_000`, `block_001`, ... in insertion order, and each
/// block's `next` points at the one pushed after it.
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    script_id: String,
    position: Position,
    blocks: Vec<Block>,
}

impl ScriptBuilder {
    #[must_use]
    pub fn new(script_id: impl Into<String>) -> Self {
        Self {
            script_id: script_id.into(),
            position: Position::default(),
            blocks: Vec::new(),
        }
    }

    /// With canvas position
    #[inline]
    #[must_use]
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Append the event hat
    #[must_use]
    pub fn hat(self, opcode: &str, category: &str, inputs: Inputs) -> Self {
        self.push_block(opcode, category, inputs, true)
    }

    /// Append a body block
    #[must_use]
    pub fn push(self, opcode: &str, category: &str, inputs: Inputs) -> Self {
        self.push_block(opcode, category, inputs, false)
    }

    fn push_block(mut self, opcode: &str, category: &str, inputs: Inputs, hat: bool) -> Self {
        let block_id = format!("block_{:03}", self.blocks.len());
        if let Some(prev) = self.blocks.last_mut() {
            prev.next = Some(block_id.clone());
        }
        let mut block = Block::new(block_id, opcode, category).with_inputs(inputs);
        block.is_hat_block = hat;
        self.blocks.push(block);
        self
    }

    /// Number of blocks so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn build(self) -> Script {
        Script {
            script_id: self.script_id,
            position: self.position,
            blocks: self.blocks,
        }
    }
}

/// Truncate on a character boundary
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
