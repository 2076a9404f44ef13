//! Program validator
//!
//! Gates, checked in order; the first violation wins:
//! 1. shape (required fields and types)
//! 2. script ids unique across the program
//! 3. scripts non-empty
//! 4. block ids unique within a script
//! 5. head block is a hat with an event opcode
//! 6. no hat below the head
//! 7. opcode allowlist, catalog category, `next` integrity, reachability

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use snapgen_program::{is_event_hat, GeneratedProgram, KnowledgeBase, Script};

use crate::error::ValidationError;
use crate::shape::{check_program, Shape};

/// Structural validator backed by a knowledge base
#[derive(Debug, Clone)]
pub struct ProgramValidator {
    knowledge: Arc<KnowledgeBase>,
}

impl ProgramValidator {
    /// Create validator over a knowledge base
    #[inline]
    #[must_use]
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// The allowlist in use
    #[inline]
    #[must_use]
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Validate raw JSON
    ///
    /// Error-marker programs (payload carries `error`) pass unconditionally.
    ///
    /// # Errors
    /// Returns the first gate violation.
    pub fn check_value(&self, value: &Value) -> Result<(), ValidationError> {
        match check_program(value)? {
            Shape::ErrorMarker => Ok(()),
            Shape::Program => {
                let program = deserialize(value)?;
                self.check_gates(&program)
            }
        }
    }

    /// Validate raw JSON and return the typed program
    ///
    /// # Errors
    /// Returns the first gate violation, or a shape error if an error-marker
    /// program cannot be read into the typed model.
    pub fn validate_value(&self, value: &Value) -> Result<GeneratedProgram, ValidationError> {
        let shape = check_program(value)?;
        let program = deserialize(value)?;
        if shape == Shape::Program {
            self.check_gates(&program)?;
        }
        Ok(program)
    }

    /// Validate an already typed program
    ///
    /// # Errors
    /// Returns the first gate violation.
    pub fn validate(&self, program: &GeneratedProgram) -> Result<(), ValidationError> {
        if program.is_error() {
            return Ok(());
        }
        // the typed model guarantees gate 1 except for these two
        if program.command != snapgen_program::CREATE_BLOCKS_COMMAND {
            return Err(ValidationError::schema(
                "command",
                format!("must be 'create_blocks', got '{}'", program.command),
            ));
        }
        if program.target_sprite().trim().is_empty() {
            return Err(ValidationError::schema(
                "payload.target_sprite",
                "must not be empty",
            ));
        }
        self.check_gates(program)
    }

    fn check_gates(&self, program: &GeneratedProgram) -> Result<(), ValidationError> {
        let mut seen_scripts = HashSet::new();
        for (script_index, script) in program.scripts().iter().enumerate() {
            if !seen_scripts.insert(script.script_id.as_str()) {
                return Err(ValidationError::DuplicateScript {
                    script_index,
                    script_id: script.script_id.clone(),
                });
            }
            self.check_script(script_index, script)?;
        }
        tracing::debug!(
            scripts = program.scripts().len(),
            blocks = program.block_count(),
            "program passed validation"
        );
        Ok(())
    }

    fn check_script(&self, script_index: usize, script: &Script) -> Result<(), ValidationError> {
        let Some(head) = script.blocks.first() else {
            return Err(ValidationError::EmptyScript {
                script_index,
                script_id: script.script_id.clone(),
            });
        };

        let mut ids = HashSet::with_capacity(script.blocks.len());
        for block in &script.blocks {
            if !ids.insert(block.block_id.as_str()) {
                return Err(ValidationError::DuplicateBlock {
                    script_index,
                    script_id: script.script_id.clone(),
                    block_id: block.block_id.clone(),
                });
            }
        }

        if !head.is_hat_block {
            return Err(ValidationError::HeadNotHat {
                script_index,
                block_id: head.block_id.clone(),
            });
        }
        if !is_event_hat(&head.opcode) {
            return Err(ValidationError::InvalidHatOpcode {
                script_index,
                block_id: head.block_id.clone(),
                opcode: head.opcode.clone(),
            });
        }

        for (position, block) in script.blocks.iter().enumerate().skip(1) {
            if block.is_hat_block || is_event_hat(&block.opcode) {
                return Err(ValidationError::MisplacedHat {
                    script_index,
                    block_id: block.block_id.clone(),
                    position,
                });
            }
        }

        for (block_index, block) in script.blocks.iter().enumerate() {
            let Some(expected) = self.knowledge.category_of(&block.opcode) else {
                return Err(ValidationError::DisallowedOpcode {
                    script_index,
                    block_index,
                    block_id: block.block_id.clone(),
                    opcode: block.opcode.clone(),
                });
            };
            if expected != block.category {
                return Err(ValidationError::CategoryMismatch {
                    script_index,
                    block_index,
                    opcode: block.opcode.clone(),
                    expected: expected.to_string(),
                    actual: block.category.clone(),
                });
            }
            if let Some(next) = &block.next {
                if !ids.contains(next.as_str()) {
                    return Err(ValidationError::DanglingNext {
                        script_index,
                        block_index,
                        script_id: script.script_id.clone(),
                        block_id: block.block_id.clone(),
                        target: next.clone(),
                    });
                }
            }
        }

        check_reachability(script_index, script)
    }
}

fn check_reachability(script_index: usize, script: &Script) -> Result<(), ValidationError> {
    let mut visited: HashSet<&str> = HashSet::with_capacity(script.blocks.len());
    let mut cursor = script.blocks.first();
    while let Some(block) = cursor {
        if !visited.insert(block.block_id.as_str()) {
            return Err(ValidationError::Cycle {
                script_index,
                script_id: script.script_id.clone(),
                block_id: block.block_id.clone(),
            });
        }
        cursor = block.next.as_deref().and_then(|id| script.block(id));
    }

    let unreachable: Vec<String> = script
        .blocks
        .iter()
        .filter(|b| !visited.contains(b.block_id.as_str()))
        .map(|b| b.block_id.clone())
        .collect();
    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Unreachable {
            script_index,
            script_id: script.script_id.clone(),
            block_ids: unreachable,
        })
    }
}

fn deserialize(value: &Value) -> Result<GeneratedProgram, ValidationError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ValidationError::schema("payload", e.to_string()))
}
