//! Intent extraction
//!
//! Rule-based reading of request text. The request is lowercased and split
//! into clauses on `and`, `then`, commas and semicolons. Each clause that
//! names a known action becomes one [`Intent`]; clauses without an action
//! are dropped, so an empty result means "nothing recognized".

use regex::Regex;
use serde_json::Value;
use snapgen_program::{Intent, Subject};

use crate::error::{ComposeError, IntentError};

/// Actions in match priority; the first matching row wins
const ACTIONS: &[(&str, &str)] = &[
    ("goto", r"\b(?:go to|goes to|goto|teleport|teleports|warp)\b"),
    ("move", r"\b(?:move|moves|moving|walk|walks|go|goes|step|advance)\b"),
    ("turn", r"\b(?:turn|turns|turning|rotate|rotates|spin|spins|pivot)\b"),
    ("jump", r"\b(?:jump|jumps|hop|hops|leap|leaps)\b"),
    ("glide", r"\b(?:glide|glides|slide|slides|float|floats)\b"),
    ("say", r"\b(?:say|says|speak|speaks|talk|talks|announce)\b"),
    ("think", r"\b(?:think|thinks|ponder|wonder)\b"),
    ("change_costume", r"\b(?:costume|costumes|outfit)\b"),
    ("change_size", r"\b(?:size|grow|grows|shrink|shrinks|bigger|smaller|resize)\b"),
    ("show", r"\b(?:show|shows|appear|appears|visible)\b"),
    ("hide", r"\b(?:hide|hides|disappear|disappears|vanish|invisible)\b"),
    ("play_sound", r"\b(?:play sound|play a sound|sound|beep|noise)\b"),
    ("change_volume", r"\b(?:volume|louder|quieter)\b"),
    ("wait", r"\b(?:wait|waits|pause|pauses|delay)\b"),
    ("repeat", r"\b(?:repeat|repeats|loop|loops)\b"),
    ("forever", r"\b(?:forever|continuously)\b"),
    ("follow", r"\b(?:follow|follows|chase|chases|track)\b"),
    ("detect", r"\b(?:detect|detects|sense|senses|touching)\b"),
    ("bounce", r"\b(?:bounce|bounces|rebound)\b"),
];

/// Triggers in match priority; key rows capture the key in group 1
const TRIGGERS: &[(&str, &[&str])] = &[
    (
        "flag_click",
        &[
            r"\bgreen flag\b",
            r"\bwhen (?:the )?flag (?:is )?clicked\b",
            r"\bwhen (?:the )?(?:program|game) (?:starts?|begins?)\b",
            r"\bat (?:the )?start\b",
        ],
    ),
    (
        "key_press",
        &[
            r"\bwhen (?:the )?(\w+)(?: arrow)?(?: key)? (?:is )?pressed\b",
            r"\bpress(?:ing|es)? (?:the )?(\w+)(?: arrow)? key\b",
            r"\b(?:on|when) (?:the )?(\w+)(?: arrow)? key\b",
        ],
    ),
    (
        "sprite_click",
        &[
            r"\bwhen (?:this |the )?(?:sprite|character) (?:is )?clicked\b",
            r"\bclick(?:ing|ed)? (?:on )?(?:the |this )?(?:sprite|character)\b",
        ],
    ),
    ("forever", &[r"\bforever\b", r"\bcontinuously\b", r"\balways\b"]),
];

const MODIFIERS: &[(&str, &str)] = &[
    ("forever", r"\b(?:forever|continuously|always)\b"),
    ("repeat", r"\b(?:repeat|repeatedly|loop)\b"),
    ("until", r"\b(?:until|till)\b"),
    ("fast", r"\b(?:fast|quick|quickly|rapidly)\b"),
    ("slow", r"\b(?:slow|slowly|gradually)\b"),
];

const CLAUSE_SPLIT: &str = r"\s+(?:and then|and|then)\s+|\s*[,;]\s*";

/// A trigger found in text, with the pressed key when there is one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub name: &'static str,
    pub key: Option<String>,
}

#[derive(Debug)]
struct ParameterRules {
    number: Regex,
    direction: Regex,
    color: Regex,
    steps: Regex,
    degrees: Regex,
    seconds: Regex,
    times: Regex,
}

/// Compiled extraction tables
#[derive(Debug)]
pub struct IntentExtractor {
    splitter: Regex,
    actions: Vec<(&'static str, Regex)>,
    triggers: Vec<(&'static str, Vec<Regex>)>,
    modifiers: Vec<(&'static str, Regex)>,
    parameters: ParameterRules,
    stage: Regex,
}

impl IntentExtractor {
    /// Compile the extraction tables
    ///
    /// # Errors
    /// Returns error if a table entry is not a valid regex.
    pub fn new() -> Result<Self, ComposeError> {
        let actions = ACTIONS
            .iter()
            .map(|(name, re)| Ok((*name, Regex::new(re)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let triggers = TRIGGERS
            .iter()
            .map(|(name, res)| {
                let compiled = res
                    .iter()
                    .map(|re| Regex::new(re))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((*name, compiled))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let modifiers = MODIFIERS
            .iter()
            .map(|(name, re)| Ok((*name, Regex::new(re)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            splitter: Regex::new(CLAUSE_SPLIT)?,
            actions,
            triggers,
            modifiers,
            parameters: ParameterRules {
                number: Regex::new(r"-?\d+(?:\.\d+)?")?,
                direction: Regex::new(
                    r"\b(left|right|up|down|forward|forwards|backward|backwards|north|south|east|west)\b",
                )?,
                color: Regex::new(
                    r"\b(red|orange|yellow|green|blue|purple|pink|black|white|gray|grey|brown)\b",
                )?,
                steps: Regex::new(r"(-?\d+)\s*(?:steps?|pixels?)\b")?,
                degrees: Regex::new(r"(-?\d+)\s*(?:degrees?|deg)\b")?,
                seconds: Regex::new(r"(\d+(?:\.\d+)?)\s*(?:seconds?|secs?)\b")?,
                times: Regex::new(r"(\d+)\s*times?\b")?,
            },
            stage: Regex::new(r"\b(?:stage|background|backdrop)\b")?,
        })
    }

    /// Read a request into intents, one per recognized clause
    #[must_use]
    pub fn parse(&self, text: &str) -> Vec<Intent> {
        let lower = text.to_lowercase();
        self.splitter
            .split(&lower)
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .filter_map(|clause| self.parse_clause(clause))
            .collect()
    }

    fn parse_clause(&self, clause: &str) -> Option<Intent> {
        let action = self
            .actions
            .iter()
            .find(|(_, re)| re.is_match(clause))
            .map(|(name, _)| *name)?;

        let trigger = self.extract_trigger(clause);
        let parameters = self.extract_parameters(clause, trigger.as_ref());
        let modifiers: Vec<String> = self
            .modifiers
            .iter()
            .filter(|(_, re)| re.is_match(clause))
            .map(|(name, _)| (*name).to_string())
            .collect();
        let subject = if self.stage.is_match(clause) {
            Subject::Stage
        } else {
            Subject::Sprite
        };

        let mut confidence = 0.8;
        if trigger.is_some() {
            confidence += 0.1;
        }
        if !parameters.is_empty() {
            confidence += 0.1;
        }

        let mut intent = Intent::new(action, clause)
            .with_subject(subject)
            .with_modifiers(modifiers)
            .with_confidence(confidence);
        if let Some(t) = trigger {
            intent = intent.with_trigger(t.name);
        }
        for (name, value) in parameters {
            intent = intent.with_parameter(name, value);
        }
        Some(intent)
    }

    /// Find the first trigger phrase in some text
    ///
    /// Key-press phrases only count when the captured word is a real key.
    #[must_use]
    pub fn extract_trigger(&self, text: &str) -> Option<TriggerMatch> {
        let lower = text.to_lowercase();
        for (name, patterns) in &self.triggers {
            for re in patterns {
                let Some(caps) = re.captures(&lower) else {
                    continue;
                };
                if *name == "key_press" {
                    let key = caps.get(1).and_then(|m| key_option(m.as_str()));
                    if key.is_some() {
                        return Some(TriggerMatch { name, key });
                    }
                } else {
                    return Some(TriggerMatch { name, key: None });
                }
            }
        }
        None
    }

    fn extract_parameters(
        &self,
        clause: &str,
        trigger: Option<&TriggerMatch>,
    ) -> Vec<(&'static str, Value)> {
        let rules = &self.parameters;
        let mut out = Vec::new();

        let numbers: Vec<Value> = rules
            .number
            .find_iter(clause)
            .filter_map(|m| number_value(m.as_str()))
            .collect();
        if !numbers.is_empty() {
            out.push(("number", Value::Array(numbers)));
        }
        if let Some(m) = rules.direction.captures(clause).and_then(|c| c.get(1)) {
            out.push(("direction", Value::from(m.as_str())));
        }
        if let Some(m) = rules.color.captures(clause).and_then(|c| c.get(1)) {
            out.push(("color", Value::from(m.as_str())));
        }
        for (name, re) in [
            ("steps", &rules.steps),
            ("degrees", &rules.degrees),
            ("seconds", &rules.seconds),
            ("times", &rules.times),
        ] {
            if let Some(v) = re
                .captures(clause)
                .and_then(|c| c.get(1))
                .and_then(|m| number_value(m.as_str()))
            {
                out.push((name, v));
            }
        }
        if let Some(key) = trigger.and_then(|t| t.key.clone()) {
            out.push(("key", Value::from(key)));
        }
        out
    }

    /// Check an intent for completeness
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn check(&self, intent: &Intent) -> Result<(), IntentError> {
        if !ACTIONS.iter().any(|(name, _)| *name == intent.action()) {
            return Err(IntentError::UnknownAction(intent.action().to_string()));
        }
        if let Some(trigger) = intent.trigger() {
            if !TRIGGERS.iter().any(|(name, _)| *name == trigger) {
                return Err(IntentError::UnknownTrigger(trigger.to_string()));
            }
        }
        match intent.action() {
            "move"
                if intent.parameter("steps").is_none()
                    && intent.parameter("direction").is_none() =>
            {
                Err(IntentError::MoveNeedsAmount)
            }
            "turn" if intent.parameter("degrees").is_none() => Err(IntentError::TurnNeedsDegrees),
            _ => Ok(()),
        }
    }

    /// Action names the extractor can produce
    pub fn actions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.iter().map(|(name, _)| *name)
    }
}

/// Renderer key name for a spoken key, if it is one
fn key_option(word: &str) -> Option<String> {
    match word {
        "space" | "enter" | "any" => Some(word.to_string()),
        "up" | "down" | "left" | "right" => Some(format!("{word} arrow")),
        w if w.len() == 1 && w.chars().all(|c| c.is_ascii_alphanumeric()) => Some(w.to_string()),
        _ => None,
    }
}

fn number_value(text: &str) -> Option<Value> {
    if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    } else {
        text.parse::<i64>().ok().map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> IntentExtractor {
        IntentExtractor::new().unwrap()
    }

    #[test]
    fn turn_with_degrees() {
        let intents = extractor().parse("Turn right 90 degrees");
        assert_eq!(intents.len(), 1);
        let turn = &intents[0];
        assert_eq!(turn.action(), "turn");
        assert_eq!(turn.parameter("degrees"), Some(&json!(90)));
        assert_eq!(turn.parameter("direction"), Some(&json!("right")));
        assert_eq!(turn.parameter("number"), Some(&json!([90])));
        assert!(extractor().check(turn).is_ok());
    }

    #[test]
    fn splits_on_connectives() {
        let intents = extractor().parse("move 10 steps and then turn 15 degrees, say hello; jump");
        let actions: Vec<_> = intents.iter().map(Intent::action).collect();
        assert_eq!(actions, vec!["move", "turn", "say", "jump"]);
    }

    #[test]
    fn clause_without_action_is_dropped() {
        let intents = extractor().parse("when the green flag is clicked, jump");
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action(), "jump");
        assert_eq!(intents[0].trigger(), None);
    }

    #[test]
    fn nothing_recognized() {
        assert!(extractor().parse("draw a colorful spiral pattern").is_empty());
        assert!(extractor().parse("").is_empty());
    }

    #[test]
    fn goto_beats_move() {
        let intents = extractor().parse("go to the center");
        assert_eq!(intents[0].action(), "goto");
    }

    #[test]
    fn key_trigger_captures_key() {
        let e = extractor();
        let t = e.extract_trigger("When the space key is pressed").unwrap();
        assert_eq!(t.name, "key_press");
        assert_eq!(t.key.as_deref(), Some("space"));

        let t = e.extract_trigger("when up arrow pressed move up 10 steps").unwrap();
        assert_eq!(t.key.as_deref(), Some("up arrow"));

        let intents = e.parse("when a key pressed move 5 steps");
        assert_eq!(intents[0].trigger(), Some("key_press"));
        assert_eq!(intents[0].parameter("key"), Some(&json!("a")));
    }

    #[test]
    fn key_trigger_needs_real_key() {
        assert_eq!(extractor().extract_trigger("when button pressed"), None);
    }

    #[test]
    fn other_triggers() {
        let e = extractor();
        assert_eq!(e.extract_trigger("when green flag clicked").unwrap().name, "flag_click");
        assert_eq!(
            e.extract_trigger("when this sprite is clicked").unwrap().name,
            "sprite_click"
        );
        assert_eq!(e.extract_trigger("spin forever").unwrap().name, "forever");
    }

    #[test]
    fn seconds_and_times() {
        let intents = extractor().parse("wait 1.5 seconds");
        assert_eq!(intents[0].parameter("seconds"), Some(&json!(1.5)));

        let intents = extractor().parse("repeat 4 times");
        assert_eq!(intents[0].action(), "repeat");
        assert_eq!(intents[0].parameter("times"), Some(&json!(4)));
    }

    #[test]
    fn modifiers_and_subject() {
        let intents = extractor().parse("slowly change the stage backdrop costume");
        let intent = &intents[0];
        assert!(intent.has_modifier("slow"));
        assert_eq!(intent.subject(), Subject::Stage);
    }

    #[test]
    fn confidence_reflects_detail() {
        let e = extractor();
        let bare = &e.parse("jump")[0];
        let rich = &e.parse("when space key pressed jump 3 times")[0];
        assert!((bare.confidence() - 0.8).abs() < 1e-9);
        assert!((rich.confidence() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn move_and_turn_checks() {
        let e = extractor();
        let bare_move = Intent::new("move", "move");
        assert_eq!(e.check(&bare_move), Err(IntentError::MoveNeedsAmount));

        let bare_turn = Intent::new("turn", "turn");
        assert_eq!(e.check(&bare_turn), Err(IntentError::TurnNeedsDegrees));

        let unknown = Intent::new("fly", "fly");
        assert_eq!(
            e.check(&unknown).unwrap_err().to_string(),
            "Unknown action: fly"
        );

        let directed = Intent::new("move", "move left").with_parameter("direction", "left");
        assert!(e.check(&directed).is_ok());
    }
}
