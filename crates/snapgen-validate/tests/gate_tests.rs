//! Gate Tests
//!
//! One program per gate, each violating exactly that gate, plus checks
//! that the earliest violated gate is the one reported.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use snapgen_program::{GeneratedProgram, KnowledgeBase};
use snapgen_validate::{ProgramValidator, ValidationError};

fn validator() -> ProgramValidator {
    ProgramValidator::new(Arc::new(KnowledgeBase::builtin().unwrap()))
}

fn block(id: &str, opcode: &str, category: &str, hat: bool, next: Option<&str>) -> Value {
    json!({
        "block_id": id,
        "opcode": opcode,
        "category": category,
        "inputs": {},
        "is_hat_block": hat,
        "next": next,
    })
}

fn program(scripts: Vec<Value>) -> Value {
    json!({
        "command": "create_blocks",
        "payload": { "target_sprite": "Sprite", "scripts": scripts }
    })
}

fn script(id: &str, blocks: Vec<Value>) -> Value {
    json!({ "script_id": id, "position": {"x": 50, "y": 50}, "blocks": blocks })
}

fn jump_script(id: &str) -> Value {
    script(
        id,
        vec![
            block("b0", "whenGreenFlag", "control", true, Some("b1")),
            block("b1", "changeYPosition", "motion", false, Some("b2")),
            block("b2", "doWait", "control", false, Some("b3")),
            block("b3", "changeYPosition", "motion", false, None),
        ],
    )
}

#[test]
fn test_well_formed_program_passes() {
    let v = validator();
    let raw = program(vec![jump_script("s1"), jump_script("s2")]);
    let typed = v.validate_value(&raw).unwrap();
    assert_eq!(typed.block_count(), 8);
    assert!(v.validate(&typed).is_ok());
}

#[test]
fn test_gate2_duplicate_script_id() {
    let err = validator()
        .check_value(&program(vec![jump_script("s1"), jump_script("s1")]))
        .unwrap_err();
    assert_eq!(err.gate(), 2);
    assert_eq!(err.to_string(), "Duplicate script_id found: 's1'");
    assert_eq!(err.path(), "payload.scripts[1].script_id");
}

#[test]
fn test_gate3_empty_script() {
    let err = validator()
        .check_value(&program(vec![script("s1", vec![])]))
        .unwrap_err();
    assert_eq!(err.to_string(), "Script 's1' cannot be empty.");
}

#[test]
fn test_gate4_duplicate_block_id() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![
                block("b0", "whenGreenFlag", "control", true, Some("b0")),
                block("b0", "forward", "motion", false, None),
            ],
        )]))
        .unwrap_err();
    assert!(matches!(err, ValidationError::DuplicateBlock { ref block_id, .. } if block_id == "b0"));
}

#[test]
fn test_gate5_head_must_be_flagged_hat() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![block("b0", "forward", "motion", false, None)],
        )]))
        .unwrap_err();
    assert_eq!(err.to_string(), "First block 'b0' must be a hat block.");
}

#[test]
fn test_gate5_hat_must_be_event_opcode() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![block("b0", "forward", "motion", true, None)],
        )]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid hat opcode 'forward'. Must be an event block."
    );
}

#[test]
fn test_gate6_hat_below_head() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![
                block("b0", "whenGreenFlag", "control", true, Some("b1")),
                block("b1", "whenClicked", "control", true, None),
            ],
        )]))
        .unwrap_err();
    assert_eq!(err.gate(), 6);
    assert_eq!(err.to_string(), "Block 'b1' at position 1 cannot be a hat block.");
}

#[test]
fn test_gate7_disallowed_opcode() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![
                block("b0", "whenGreenFlag", "control", true, Some("b1")),
                block("b1", "launchRocket", "motion", false, None),
            ],
        )]))
        .unwrap_err();
    assert_eq!(err.to_string(), "Disallowed opcode 'launchRocket' in block 'b1'.");
    assert_eq!(err.path(), "payload.scripts[0].blocks[1].opcode");
}

#[test]
fn test_gate7_category_mismatch() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![
                block("b0", "whenGreenFlag", "control", true, Some("b1")),
                block("b1", "forward", "looks", false, None),
            ],
        )]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Opcode 'forward' must have category 'motion', but got 'looks'."
    );
}

#[test]
fn test_gate7_dangling_next() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![
                block("b0", "whenGreenFlag", "control", true, Some("b1")),
                block("b1", "forward", "motion", false, Some("b9")),
            ],
        )]))
        .unwrap_err();
    assert!(matches!(err, ValidationError::DanglingNext { ref target, .. } if target == "b9"));
}

#[test]
fn test_gate7_unreachable_block() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![
                block("b0", "whenGreenFlag", "control", true, None),
                block("b1", "forward", "motion", false, None),
            ],
        )]))
        .unwrap_err();
    match err {
        ValidationError::Unreachable { block_ids, .. } => assert_eq!(block_ids, vec!["b1"]),
        other => panic!("expected Unreachable, got {other:?}"),
    }
}

#[test]
fn test_gate7_cycle() {
    let err = validator()
        .check_value(&program(vec![script(
            "s1",
            vec![
                block("b0", "whenGreenFlag", "control", true, Some("b1")),
                block("b1", "forward", "motion", false, Some("b2")),
                block("b2", "turn", "motion", false, Some("b1")),
            ],
        )]))
        .unwrap_err();
    assert!(matches!(err, ValidationError::Cycle { ref block_id, .. } if block_id == "b1"));
}

/// Earliest gate wins: a script that is both duplicated and has a bad
/// opcode reports the duplicate first.
#[test]
fn test_first_violation_is_reported() {
    let bad = script(
        "s1",
        vec![block("b0", "whenGreenFlag", "control", true, Some("x"))],
    );
    let err = validator()
        .check_value(&program(vec![jump_script("s1"), bad]))
        .unwrap_err();
    assert_eq!(err.gate(), 2);
}

#[test]
fn test_schema_error_carries_path() {
    let mut raw = program(vec![jump_script("s1")]);
    raw["payload"]["scripts"][0]["blocks"][2]["is_hat_block"] = json!("no");
    let err = validator().check_value(&raw).unwrap_err();
    assert_eq!(err.gate(), 1);
    assert_eq!(err.path(), "payload.scripts[0].blocks[2].is_hat_block");
}

#[test]
fn test_error_marker_bypasses_gates() {
    let marker = GeneratedProgram::error_fallback("backend down", "draw a spiral");
    let raw = serde_json::to_value(&marker).unwrap();
    let v = validator();
    assert!(v.check_value(&raw).is_ok());
    assert!(v.validate(&marker).is_ok());
    assert!(v.validate_value(&raw).unwrap().is_error());
}

#[test]
fn test_empty_program_is_valid() {
    assert!(validator().check_value(&program(vec![])).is_ok());
}

fn chain(len: usize) -> Vec<Value> {
    let mut blocks = vec![block("b0", "whenGreenFlag", "control", true, (len > 0).then_some("b1"))];
    for i in 1..=len {
        let id = format!("b{i}");
        let next = (i < len).then(|| format!("b{}", i + 1));
        blocks.push(block(&id, "forward", "motion", false, next.as_deref()));
    }
    blocks
}

proptest! {
    #[test]
    fn test_linked_chains_of_any_length_pass(len in 0usize..20) {
        let typed = validator().validate_value(&program(vec![script("s1", chain(len))])).unwrap();
        prop_assert_eq!(typed.block_count(), len + 1);
    }

    #[test]
    fn test_breaking_any_link_is_reported(len in 2usize..20, cut in 1usize..19) {
        let cut = cut.min(len - 1);
        let mut blocks = chain(len);
        blocks[cut]["next"] = Value::Null;
        let err = validator().check_value(&program(vec![script("s1", blocks)])).unwrap_err();
        prop_assert!(matches!(err, ValidationError::Unreachable { .. }), "{err:?}");
    }

    #[test]
    fn test_hat_anywhere_below_head_is_misplaced(len in 1usize..20, at in 1usize..20) {
        let at = at.min(len);
        let mut blocks = chain(len);
        blocks[at]["opcode"] = json!("whenGreenFlag");
        blocks[at]["category"] = json!("control");
        blocks[at]["is_hat_block"] = json!(true);
        let err = validator().check_value(&program(vec![script("s1", blocks)])).unwrap_err();
        prop_assert!(matches!(err, ValidationError::MisplacedHat { .. }), "{err:?}");
    }

    #[test]
    fn test_next_to_missing_block_is_dangling(len in 0usize..20, at in 0usize..20) {
        let at = at.min(len);
        let mut blocks = chain(len);
        blocks[at]["next"] = json!("missing");
        let err = validator().check_value(&program(vec![script("s1", blocks)])).unwrap_err();
        prop_assert!(matches!(err, ValidationError::DanglingNext { .. }), "{err:?}");
    }
}
