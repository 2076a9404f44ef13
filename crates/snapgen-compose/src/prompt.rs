//! Prompt construction and model selection for the generative path

use serde_json::json;
use snapgen_program::{GeneratedProgram, Inputs, KnowledgeBase, ScriptBuilder};

use crate::config::GenerationOptions;

/// Which model a request is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// Fast, cheap model
    Light,
    /// Stronger model for long or logic-heavy requests
    Heavy,
}

const LOGIC_WORDS: [&str; 6] = ["if", "when", "while", "until", "and", "then"];

/// Pick a model tier for a request
///
/// Heavy when the request is longer than `word_threshold` words or uses a
/// conditional/sequencing word.
#[must_use]
pub fn select_tier(request: &str, word_threshold: usize) -> ModelTier {
    let lower = request.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() > word_threshold || words.iter().any(|w| LOGIC_WORDS.contains(w)) {
        ModelTier::Heavy
    } else {
        ModelTier::Light
    }
}

/// Builds the instruction prompt sent to the backend
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    catalog: String,
    examples: String,
}

impl PromptBuilder {
    /// Precompute the catalog listing for a knowledge base
    #[must_use]
    pub fn new(knowledge: &KnowledgeBase) -> Self {
        let catalog = knowledge
            .categories()
            .map(|(category, opcodes)| format!("- {}: {}", category.to_uppercase(), opcodes.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            catalog,
            examples: render_examples(),
        }
    }

    /// Full prompt for one request
    #[must_use]
    pub fn build(&self, request: &str, options: &GenerationOptions) -> String {
        format!(
            "You are an expert Snap! block generator. Output ONLY valid JSON describing a \
             create_blocks program. No prose, no markdown.\n\n\
             CRITICAL RULES:\n\
             1. The top-level object has \"command\": \"create_blocks\" and a \"payload\" with \
             \"target_sprite\" and \"scripts\".\n\
             2. Every script starts with exactly one hat block (whenGreenFlag, whenKeyPressed, \
             whenClicked, whenIReceive) with \"is_hat_block\": true.\n\
             3. No other block in a script may be a hat block.\n\
             4. Every block has block_id, opcode, category, inputs, is_hat_block and next; \
             next is the block_id of the following block or null for the last one.\n\
             5. Use ONLY the opcodes listed below, with the category they are listed under.\n\
             6. Script positions are integer x and y coordinates.\n\n\
             EXAMPLES:\n{examples}\n\n\
             AVAILABLE OPCODES BY CATEGORY:\n{catalog}\n\n\
             TARGET SPRITE: {target}\n\
             COMPLEXITY: {complexity} ({guidance})\n\n\
             USER REQUEST: {request}\n",
            examples = self.examples,
            catalog = self.catalog,
            target = options.target_sprite,
            complexity = options.complexity.as_str(),
            guidance = options.complexity.guidance(),
            request = request.trim(),
        )
    }
}

fn render_examples() -> String {
    let jump_script = ScriptBuilder::new("script_001")
        .hat("whenGreenFlag", "control", Inputs::new())
        .push("changeYPosition", "motion", as_inputs(json!({"DY": 50})))
        .push("doWait", "control", as_inputs(json!({"SECONDS": 0.3})))
        .push("changeYPosition", "motion", as_inputs(json!({"DY": -50})))
        .build();

    let spin_script = ScriptBuilder::new("script_001")
        .hat(
            "whenKeyPressed",
            "control",
            as_inputs(json!({"KEY_OPTION": "space"})),
        )
        .push("turn", "motion", as_inputs(json!({"DEGREES": 90})))
        .build();

    [
        ("make the sprite jump", jump_script),
        ("when space is pressed turn 90 degrees", spin_script),
    ]
    .into_iter()
    .map(|(request, script)| {
        let program = GeneratedProgram::new("Sprite", vec![script]);
        let body = serde_json::to_string(&program).unwrap_or_default();
        format!("Request: \"{request}\"\nOutput: {body}")
    })
    .collect::<Vec<_>>()
    .join("\n\n")
}

fn as_inputs(value: serde_json::Value) -> Inputs {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Inputs::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_plain_request_is_light() {
        assert_eq!(select_tier("make the sprite spin", 15), ModelTier::Light);
    }

    #[test]
    fn logic_words_are_heavy() {
        assert_eq!(select_tier("jump if touching red", 15), ModelTier::Heavy);
        assert_eq!(select_tier("walk, then wave", 15), ModelTier::Heavy);
    }

    #[test]
    fn long_request_is_heavy() {
        let long = "draw ".repeat(16);
        assert_eq!(select_tier(&long, 15), ModelTier::Heavy);
        assert_eq!(select_tier(&"draw ".repeat(15), 15), ModelTier::Light);
    }

    #[test]
    fn prompt_lists_catalog_and_request() {
        let kb = KnowledgeBase::builtin().unwrap();
        let prompt = PromptBuilder::new(&kb).build("  draw a spiral ", &GenerationOptions::new("Cat"));
        assert!(prompt.starts_with("You are an expert Snap! block generator."));
        assert!(prompt.contains("- MOTION: forward, turn"));
        assert!(prompt.contains("\"opcode\":\"changeYPosition\""));
        assert!(prompt.contains("TARGET SPRITE: Cat\nCOMPLEXITY: beginner"));
        assert!(prompt.ends_with("USER REQUEST: draw a spiral\n"));
    }
}
