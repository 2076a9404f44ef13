//! Typed renderer commands
//!
//! Each variant owns its wire name and builds its own payload, so adding a
//! command means adding a variant and the compiler finds every match.

use serde_json::{json, Value};
use snapgen_program::GeneratedProgram;

/// Wire names, in the order advertised to the renderer
pub const SUPPORTED_COMMANDS: [&str; 8] = [
    "create_blocks",
    "read_project",
    "execute_script",
    "inspect_state",
    "delete_blocks",
    "create_custom_block",
    "highlight_blocks",
    "export_project",
];

/// A command the server can send to a renderer
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Materialize a generated program
    CreateBlocks {
        program: GeneratedProgram,
        animate: bool,
    },
    ReadProject { detail_level: String },
    ExecuteScript { code: String, sandbox: bool },
    InspectState { query: Value },
    DeleteBlocks {
        target_sprite: String,
        selection: Value,
    },
    /// Define a custom block; the definition object is passed through as-is
    CreateCustomBlock { spec: Value },
    HighlightBlocks {
        block_ids: Vec<String>,
        duration_ms: u64,
        tooltip: Option<String>,
    },
    ExportProject { format: String, include_media: bool },
}

impl Command {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateBlocks { .. } => "create_blocks",
            Self::ReadProject { .. } => "read_project",
            Self::ExecuteScript { .. } => "execute_script",
            Self::InspectState { .. } => "inspect_state",
            Self::DeleteBlocks { .. } => "delete_blocks",
            Self::CreateCustomBlock { .. } => "create_custom_block",
            Self::HighlightBlocks { .. } => "highlight_blocks",
            Self::ExportProject { .. } => "export_project",
        }
    }

    /// `inspect_state` query used to probe renderer readiness
    #[must_use]
    pub fn snap_ready() -> Self {
        Self::InspectState {
            query: json!({"type": "snap_ready"}),
        }
    }

    /// Wire payload
    ///
    /// # Errors
    /// Returns error if the program cannot be serialized.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        let payload = match self {
            Self::CreateBlocks { program, animate } => {
                let mut payload = serde_json::to_value(&program.payload)?;
                if let Value::Object(fields) = &mut payload {
                    fields.insert(
                        "visual_feedback".to_string(),
                        json!({
                            "animate_creation": animate,
                            "highlight_duration_ms": 2000,
                            "show_explanation": true,
                        }),
                    );
                }
                payload
            }
            Self::ReadProject { detail_level } => json!({
                "include": {
                    "sprites": true,
                    "scripts": true,
                    "variables": true,
                    "custom_blocks": true,
                    "stage": true,
                },
                "detail_level": detail_level,
            }),
            Self::ExecuteScript { code, sandbox } => json!({
                "javascript_code": code,
                "return_result": true,
                "sandbox_mode": sandbox,
            }),
            Self::InspectState { query } => json!({ "query": query }),
            Self::DeleteBlocks {
                target_sprite,
                selection,
            } => json!({
                "target_sprite": target_sprite,
                "selection": selection,
                "options": {
                    "confirm_before_delete": false,
                    "create_undo_snapshot": true,
                },
            }),
            Self::CreateCustomBlock { spec } => spec.clone(),
            Self::HighlightBlocks {
                block_ids,
                duration_ms,
                tooltip,
            } => {
                let mut payload = json!({
                    "block_ids": block_ids,
                    "highlight_style": {
                        "color": "#FFD700",
                        "duration_ms": duration_ms,
                        "pulse": true,
                    },
                });
                if let (Some(text), Value::Object(fields)) = (tooltip, &mut payload) {
                    fields.insert(
                        "show_tooltip".to_string(),
                        json!({"text": text, "position": "above"}),
                    );
                }
                payload
            }
            Self::ExportProject {
                format,
                include_media,
            } => json!({
                "format": format,
                "include_media": include_media,
                "compress": false,
            }),
        };
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapgen_program::{Inputs, ScriptBuilder};

    #[test]
    fn names_match_advertised_list() {
        let all = [
            Command::CreateBlocks {
                program: GeneratedProgram::new("Sprite", vec![]),
                animate: true,
            },
            Command::ReadProject {
                detail_level: "summary".into(),
            },
            Command::ExecuteScript {
                code: "1+1".into(),
                sandbox: true,
            },
            Command::snap_ready(),
            Command::DeleteBlocks {
                target_sprite: "Sprite".into(),
                selection: json!({"all": true}),
            },
            Command::CreateCustomBlock { spec: json!({}) },
            Command::HighlightBlocks {
                block_ids: vec![],
                duration_ms: 2000,
                tooltip: None,
            },
            Command::ExportProject {
                format: "xml".into(),
                include_media: false,
            },
        ];
        let names: Vec<&str> = all.iter().map(Command::name).collect();
        assert_eq!(names, SUPPORTED_COMMANDS);
    }

    #[test]
    fn create_blocks_payload_carries_program_and_feedback() {
        let script = ScriptBuilder::new("script_001")
            .hat("whenGreenFlag", "control", Inputs::new())
            .build();
        let command = Command::CreateBlocks {
            program: GeneratedProgram::new("Cat", vec![script]),
            animate: false,
        };
        let payload = command.payload().unwrap();
        assert_eq!(payload["target_sprite"], "Cat");
        assert_eq!(payload["scripts"][0]["blocks"][0]["opcode"], "whenGreenFlag");
        assert_eq!(payload["visual_feedback"]["animate_creation"], false);
        assert_eq!(payload["visual_feedback"]["highlight_duration_ms"], 2000);
        assert!(payload.get("error").is_none());
    }

    #[test]
    fn highlight_tooltip_is_optional() {
        let plain = Command::HighlightBlocks {
            block_ids: vec!["block_001".into()],
            duration_ms: 500,
            tooltip: None,
        };
        assert!(plain.payload().unwrap().get("show_tooltip").is_none());

        let tipped = Command::HighlightBlocks {
            block_ids: vec!["block_001".into()],
            duration_ms: 500,
            tooltip: Some("this one".into()),
        };
        let payload = tipped.payload().unwrap();
        assert_eq!(payload["show_tooltip"]["position"], "above");
        assert_eq!(payload["highlight_style"]["color"], "#FFD700");
    }

    #[test]
    fn snap_ready_query() {
        assert_eq!(
            Command::snap_ready().payload().unwrap(),
            json!({"query": {"type": "snap_ready"}})
        );
    }
}
