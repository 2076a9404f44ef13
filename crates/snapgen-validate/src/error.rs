//! Validation errors
//!
//! Every variant names the offending script/block and can render the
//! field path it refers to, e.g. `payload.scripts[0].blocks[2].category`.

/// First gate that rejected a program
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Gate 1: shape or type mismatch
    #[error("{path}: {reason}")]
    Schema { path: String, reason: String },

    /// Gate 2: script id reused
    #[error("Duplicate script_id found: '{script_id}'")]
    DuplicateScript { script_index: usize, script_id: String },

    /// Gate 3: script has no blocks
    #[error("Script '{script_id}' cannot be empty.")]
    EmptyScript { script_index: usize, script_id: String },

    /// Gate 4: block id reused inside one script
    #[error("Duplicate block_id '{block_id}' in script '{script_id}'")]
    DuplicateBlock {
        script_index: usize,
        script_id: String,
        block_id: String,
    },

    /// Gate 5: head is not flagged as a hat
    #[error("First block '{block_id}' must be a hat block.")]
    HeadNotHat { script_index: usize, block_id: String },

    /// Gate 5: head is flagged but is not an event opcode
    #[error("Invalid hat opcode '{opcode}'. Must be an event block.")]
    InvalidHatOpcode {
        script_index: usize,
        block_id: String,
        opcode: String,
    },

    /// Gate 6: hat below the head
    #[error("Block '{block_id}' at position {position} cannot be a hat block.")]
    MisplacedHat {
        script_index: usize,
        block_id: String,
        position: usize,
    },

    /// Gate 7: opcode outside the allowlist
    #[error("Disallowed opcode '{opcode}' in block '{block_id}'.")]
    DisallowedOpcode {
        script_index: usize,
        block_index: usize,
        block_id: String,
        opcode: String,
    },

    /// Gate 7: declared category disagrees with the catalog
    #[error("Opcode '{opcode}' must have category '{expected}', but got '{actual}'.")]
    CategoryMismatch {
        script_index: usize,
        block_index: usize,
        opcode: String,
        expected: String,
        actual: String,
    },

    /// Gate 7: `next` names a block outside the script
    #[error("Block '{block_id}' points to non-existent next block '{target}' in script '{script_id}'.")]
    DanglingNext {
        script_index: usize,
        block_index: usize,
        script_id: String,
        block_id: String,
        target: String,
    },

    /// Gate 7: `next` chain loops back on itself
    #[error("Block chain in script '{script_id}' loops back to '{block_id}'.")]
    Cycle {
        script_index: usize,
        script_id: String,
        block_id: String,
    },

    /// Gate 7: blocks not reachable from the head
    #[error("Unreachable blocks {block_ids:?} in script '{script_id}'.")]
    Unreachable {
        script_index: usize,
        script_id: String,
        block_ids: Vec<String>,
    },
}

impl ValidationError {
    /// Field path the error refers to
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Schema { path, .. } => path.clone(),
            Self::DuplicateScript { script_index, .. } => {
                format!("payload.scripts[{script_index}].script_id")
            }
            Self::EmptyScript { script_index, .. } => {
                format!("payload.scripts[{script_index}].blocks")
            }
            Self::DuplicateBlock { script_index, .. } | Self::Unreachable { script_index, .. } => {
                format!("payload.scripts[{script_index}].blocks")
            }
            Self::HeadNotHat { script_index, .. } | Self::InvalidHatOpcode { script_index, .. } => {
                format!("payload.scripts[{script_index}].blocks[0]")
            }
            Self::MisplacedHat {
                script_index,
                position,
                ..
            } => format!("payload.scripts[{script_index}].blocks[{position}].is_hat_block"),
            Self::DisallowedOpcode {
                script_index,
                block_index,
                ..
            } => format!("payload.scripts[{script_index}].blocks[{block_index}].opcode"),
            Self::CategoryMismatch {
                script_index,
                block_index,
                ..
            } => format!("payload.scripts[{script_index}].blocks[{block_index}].category"),
            Self::DanglingNext {
                script_index,
                block_index,
                ..
            } => format!("payload.scripts[{script_index}].blocks[{block_index}].next"),
            Self::Cycle { script_index, .. } => format!("payload.scripts[{script_index}]"),
        }
    }

    /// Which of the seven gates rejected the program (1-based)
    #[must_use]
    pub fn gate(&self) -> u8 {
        match self {
            Self::Schema { .. } => 1,
            Self::DuplicateScript { .. } => 2,
            Self::EmptyScript { .. } => 3,
            Self::DuplicateBlock { .. } => 4,
            Self::HeadNotHat { .. } | Self::InvalidHatOpcode { .. } => 5,
            Self::MisplacedHat { .. } => 6,
            Self::DisallowedOpcode { .. }
            | Self::CategoryMismatch { .. }
            | Self::DanglingNext { .. }
            | Self::Cycle { .. }
            | Self::Unreachable { .. } => 7,
        }
    }

    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
