//! Gate 1: structural shape of an untyped program
//!
//! Walks raw JSON before it is deserialized so that a rejection can name
//! the exact field that is missing or mistyped.

use serde_json::{Map, Value};
use snapgen_program::CREATE_BLOCKS_COMMAND;

use crate::error::ValidationError;

/// Result of the shape walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    /// Ordinary program, continue with the remaining gates
    Program,
    /// Error-marker program, exempt from the remaining gates
    ErrorMarker,
}

pub(crate) fn check_program(value: &Value) -> Result<Shape, ValidationError> {
    let root = as_object(value, "program")?;

    let command = require_str(root, "command", "command")?;
    if command != CREATE_BLOCKS_COMMAND {
        return Err(ValidationError::schema(
            "command",
            format!("must be '{CREATE_BLOCKS_COMMAND}', got '{command}'"),
        ));
    }

    let payload = as_object(require(root, "payload", "payload")?, "payload")?;

    if payload.get("error").is_some_and(|e| !e.is_null()) {
        return Ok(Shape::ErrorMarker);
    }

    let target = require_str(payload, "target_sprite", "payload.target_sprite")?;
    if target.trim().is_empty() {
        return Err(ValidationError::schema(
            "payload.target_sprite",
            "must not be empty",
        ));
    }

    let scripts = require(payload, "scripts", "payload.scripts")?
        .as_array()
        .ok_or_else(|| ValidationError::schema("payload.scripts", "expected array"))?;

    for (i, script) in scripts.iter().enumerate() {
        check_script(script, &format!("payload.scripts[{i}]"))?;
    }

    Ok(Shape::Program)
}

fn check_script(value: &Value, path: &str) -> Result<(), ValidationError> {
    let script = as_object(value, path)?;
    require_str(script, "script_id", &format!("{path}.script_id"))?;

    let position_path = format!("{path}.position");
    let position = as_object(
        require(script, "position", &position_path)?,
        &position_path,
    )?;
    for axis in ["x", "y"] {
        let axis_path = format!("{position_path}.{axis}");
        let v = require(position, axis, &axis_path)?;
        if v.as_i64().is_none() {
            return Err(ValidationError::schema(axis_path, "expected integer"));
        }
    }

    let blocks_path = format!("{path}.blocks");
    let blocks = require(script, "blocks", &blocks_path)?
        .as_array()
        .ok_or_else(|| ValidationError::schema(&blocks_path, "expected array"))?;

    for (j, block) in blocks.iter().enumerate() {
        check_block(block, &format!("{blocks_path}[{j}]"))?;
    }
    Ok(())
}

fn check_block(value: &Value, path: &str) -> Result<(), ValidationError> {
    let block = as_object(value, path)?;

    let id = require_str(block, "block_id", &format!("{path}.block_id"))?;
    if id.is_empty() {
        return Err(ValidationError::schema(
            format!("{path}.block_id"),
            "must not be empty",
        ));
    }
    require_str(block, "opcode", &format!("{path}.opcode"))?;
    require_str(block, "category", &format!("{path}.category"))?;

    if let Some(inputs) = block.get("inputs") {
        if !inputs.is_object() {
            return Err(ValidationError::schema(
                format!("{path}.inputs"),
                "expected object",
            ));
        }
    }

    if !require(block, "is_hat_block", &format!("{path}.is_hat_block"))?.is_boolean() {
        return Err(ValidationError::schema(
            format!("{path}.is_hat_block"),
            "expected boolean",
        ));
    }

    match block.get("next") {
        None | Some(Value::Null | Value::String(_)) => Ok(()),
        Some(_) => Err(ValidationError::schema(
            format!("{path}.next"),
            "expected string or null",
        )),
    }
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::schema(path, "expected object"))
}

fn require<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, ValidationError> {
    object
        .get(key)
        .ok_or_else(|| ValidationError::schema(path, "missing required field"))
}

fn require_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a str, ValidationError> {
    require(object, key, path)?
        .as_str()
        .ok_or_else(|| ValidationError::schema(path, "expected string"))
}
