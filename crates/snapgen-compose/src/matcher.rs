//! Pattern matching
//!
//! Maps an intent's action onto a knowledge-base pattern: exact trigger
//! word first, then the most similar trigger word at or above the
//! configured threshold. Ties go to the trigger declared first.

use std::sync::Arc;

use snapgen_program::{BlockTemplate, Intent, KnowledgeBase, PatternDef};

/// A resolved pattern for one action
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch<'a> {
    pub name: &'a str,
    pub pattern: &'a PatternDef,
    /// 1.0 for exact hits
    pub score: f64,
    pub exact: bool,
}

/// Action -> pattern resolver
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    knowledge: Arc<KnowledgeBase>,
    threshold: f64,
}

impl PatternMatcher {
    #[inline]
    #[must_use]
    pub fn new(knowledge: Arc<KnowledgeBase>, threshold: f64) -> Self {
        Self {
            knowledge,
            threshold,
        }
    }

    /// Resolve an action name to a pattern
    #[must_use]
    pub fn find(&self, action: &str) -> Option<PatternMatch<'_>> {
        let action = action.to_lowercase();
        let map = self.knowledge.trigger_map();

        if let Some(name) = map.get(&action) {
            return self.resolved(name, 1.0, true);
        }

        let mut best: Option<(&String, f64)> = None;
        for (word, name) in map {
            let score = similarity(&action, word);
            if score < self.threshold {
                continue;
            }
            // strictly greater keeps the earliest trigger on ties
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((name, score));
            }
        }
        let (name, score) = best?;
        tracing::debug!(action = %action, pattern = %name, score, "fuzzy pattern match");
        self.resolved(name, score, false)
    }

    fn resolved<'a>(&'a self, name: &'a str, score: f64, exact: bool) -> Option<PatternMatch<'a>> {
        let pattern = self.knowledge.pattern(name)?;
        Some(PatternMatch {
            name,
            pattern,
            score,
            exact,
        })
    }

    /// Pattern blocks with intent parameters applied
    ///
    /// A parameter overrides a template input only when the upper-cased
    /// parameter name is already one of that block's inputs.
    #[must_use]
    pub fn instantiate(pattern: &PatternDef, intent: &Intent) -> Vec<BlockTemplate> {
        pattern
            .blocks
            .iter()
            .map(|template| {
                let mut block = template.clone();
                for (name, value) in intent.parameters() {
                    let key = name.to_uppercase();
                    if let Some(slot) = block.inputs.get_mut(&key) {
                        *slot = value.clone();
                    }
                }
                block
            })
            .collect()
    }
}

/// Normalized edit similarity in `[0, 1]`
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = levenshtein_distance(a, b) as f64 / longest as f64;
    1.0 - ratio
}

/// Edit distance with a two-row table
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matcher() -> PatternMatcher {
        PatternMatcher::new(Arc::new(KnowledgeBase::builtin().unwrap()), 0.6)
    }

    #[test]
    fn exact_trigger_hit() {
        let m = matcher();
        let hit = m.find("rotate").unwrap();
        assert_eq!(hit.name, "turn");
        assert!(hit.exact);
    }

    #[test]
    fn fuzzy_hit_above_threshold() {
        let m = matcher();
        let hit = m.find("jumps").unwrap();
        assert_eq!(hit.name, "jump");
        assert!(!hit.exact);
        assert!((hit.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn no_hit_below_threshold() {
        assert!(matcher().find("detect").is_none());
        assert!(matcher().find("xyzzy").is_none());
    }

    #[test]
    fn tie_goes_to_first_declared() {
        let doc = r#"{
            "blocks": {"motion": {"forward": {}, "turn": {}}},
            "patterns": {
                "first": {"triggers": ["abcd"], "blocks": [{"opcode": "forward", "category": "motion"}]},
                "second": {"triggers": ["abce"], "blocks": [{"opcode": "turn", "category": "motion"}]}
            }
        }"#;
        let m = PatternMatcher::new(Arc::new(KnowledgeBase::from_json_str(doc).unwrap()), 0.6);
        // "abcx" is one edit from both triggers
        assert_eq!(m.find("abcx").unwrap().name, "first");
    }

    #[test]
    fn parameters_override_matching_inputs_only() {
        let kb = KnowledgeBase::builtin().unwrap();
        let pattern = kb.pattern("turn").unwrap();
        let intent = Intent::new("turn", "turn right 90 degrees")
            .with_parameter("number", json!([90]))
            .with_parameter("direction", "right")
            .with_parameter("degrees", 90);

        let blocks = PatternMatcher::instantiate(pattern, &intent);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].opcode, "turn");
        assert_eq!(blocks[0].inputs.len(), 1);
        assert_eq!(blocks[0].inputs["DEGREES"], json!(90));
    }

    #[test]
    fn distance_basics() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert!((similarity("same", "same") - 1.0).abs() < f64::EPSILON);
    }

    proptest::proptest! {
        #[test]
        fn similarity_is_symmetric_and_bounded(a in "[a-z ]{0,12}", b in "[a-z ]{0,12}") {
            let ab = similarity(&a, &b);
            proptest::prop_assert!((0.0..=1.0).contains(&ab));
            proptest::prop_assert!((ab - similarity(&b, &a)).abs() < 1e-12);
        }

        #[test]
        fn lookup_is_deterministic(action in "[a-z]{1,10}") {
            let m = matcher();
            let first = m.find(&action).map(|hit| (hit.name.to_string(), hit.exact));
            let second = m.find(&action).map(|hit| (hit.name.to_string(), hit.exact));
            proptest::prop_assert_eq!(first, second);
        }
    }
}
