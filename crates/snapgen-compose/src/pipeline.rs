//! Program generation pipeline
//!
//! The entry point for turning a request into a program:
//! - cache lookup by normalized request, target and complexity
//! - rule-based path when every clause maps onto a known pattern
//! - generative path for everything else
//! - error-marker program when the generative path gives up
//!
//! Successful programs are cached; error markers never are.

use std::sync::Arc;

use serde_json::Value;
use snapgen_program::{
    truncate_chars, GeneratedProgram, Inputs, Intent, KnowledgeBase, RequestKey, ScriptBuilder,
};
use snapgen_validate::ProgramValidator;

use crate::backend::GenerativeBackend;
use crate::cache::{CacheStats, ProgramCache};
use crate::config::{CacheConfig, GenerationConfig, GenerationOptions};
use crate::engine::GenerativeEngine;
use crate::error::ComposeError;
use crate::extractor::{IntentExtractor, TriggerMatch};
use crate::matcher::PatternMatcher;
use crate::metrics::{GenerationMetrics, MetricsSnapshot};

/// How a program was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPath {
    Cache,
    RuleBased,
    Generative,
    /// Generative path failed; the program is an error marker
    Fallback,
}

impl GenerationPath {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::RuleBased => "rule_based",
            Self::Generative => "generative",
            Self::Fallback => "fallback",
        }
    }
}

/// Outcome of one generation request
#[derive(Debug, Clone)]
pub struct Generation {
    pub program: GeneratedProgram,
    pub path: GenerationPath,
    /// Intents read from the request (empty on cache hits)
    pub intents: Vec<Intent>,
}

/// Request -> program orchestrator
#[derive(Debug)]
pub struct ProgramGenerator {
    knowledge: Arc<KnowledgeBase>,
    extractor: IntentExtractor,
    matcher: PatternMatcher,
    validator: ProgramValidator,
    engine: GenerativeEngine,
    cache: ProgramCache,
    metrics: Arc<GenerationMetrics>,
    config: GenerationConfig,
}

impl ProgramGenerator {
    /// Wire the pipeline together
    ///
    /// # Errors
    /// Returns error if the extraction tables fail to compile.
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        backend: Arc<dyn GenerativeBackend>,
        config: GenerationConfig,
        cache: CacheConfig,
    ) -> Result<Self, ComposeError> {
        let metrics = Arc::new(GenerationMetrics::new());
        Ok(Self {
            extractor: IntentExtractor::new()?,
            matcher: PatternMatcher::new(knowledge.clone(), config.match_threshold),
            validator: ProgramValidator::new(knowledge.clone()),
            engine: GenerativeEngine::new(backend, knowledge.clone(), config.clone(), metrics.clone()),
            cache: ProgramCache::new(cache.capacity),
            knowledge,
            metrics,
            config,
        })
    }

    /// Produce a program for a request
    ///
    /// Always returns a program; failures surface as an error marker.
    pub async fn generate(&self, request: &str, options: &GenerationOptions) -> Generation {
        self.metrics.record_request();
        let key = RequestKey::for_request(
            request,
            &options.target_sprite,
            options.complexity.as_str(),
        );
        let shown = truncate_chars(request, 50);

        if let Some(program) = self.cache.get(&key) {
            self.metrics.record_cache_hit();
            tracing::info!(request = %shown, key = %key.short(), "cache hit");
            return Generation {
                program,
                path: GenerationPath::Cache,
                intents: Vec::new(),
            };
        }

        let intents = self.extractor.parse(request);
        match self.rule_based(request, &intents, options) {
            Ok(program) => {
                self.metrics.record_rule_based();
                self.cache.insert(key, &program);
                tracing::info!(
                    request = %shown,
                    intents = intents.len(),
                    blocks = program.block_count(),
                    "rule-based generation"
                );
                return Generation {
                    program,
                    path: GenerationPath::RuleBased,
                    intents,
                };
            }
            Err(e) => {
                tracing::debug!(request = %shown, reason = %e, "rule-based path declined");
            }
        }

        self.metrics.record_generative();
        let mut program = self.engine.generate(request, options).await;
        let path = if program.is_error() {
            GenerationPath::Fallback
        } else {
            program.payload.target_sprite.clone_from(&options.target_sprite);
            self.cache.insert(key, &program);
            GenerationPath::Generative
        };
        tracing::info!(request = %shown, path = path.as_str(), "generative generation finished");

        Generation {
            program,
            path,
            intents,
        }
    }

    /// Build a program from intents alone
    ///
    /// # Errors
    /// Declines with `ParseFailure` when there are no intents, with the
    /// intent error when one is incomplete, with `PatternMiss` when an action
    /// has no pattern, and with the validation error if the assembled
    /// program is rejected.
    pub fn rule_based(
        &self,
        request: &str,
        intents: &[Intent],
        options: &GenerationOptions,
    ) -> Result<GeneratedProgram, ComposeError> {
        if intents.is_empty() {
            return Err(ComposeError::ParseFailure(
                truncate_chars(request, 50).to_string(),
            ));
        }

        let mut patterns = Vec::with_capacity(intents.len());
        for intent in intents {
            self.extractor.check(intent)?;
            let hit = self
                .matcher
                .find(intent.action())
                .ok_or_else(|| ComposeError::PatternMiss {
                    action: intent.action().to_string(),
                })?;
            patterns.push(PatternMatcher::instantiate(hit.pattern, intent));
        }

        let (hat, hat_inputs) = hat_for(self.first_trigger(request, intents).as_ref());
        let mut builder = ScriptBuilder::new("script_001").hat(hat, "control", hat_inputs);
        for block in patterns.into_iter().flatten() {
            builder = builder.push(&block.opcode, &block.category, block.inputs);
        }

        let program = GeneratedProgram::new(options.target_sprite.clone(), vec![builder.build()]);
        self.validator.validate(&program)?;
        Ok(program)
    }

    /// First trigger among the intents, else anywhere in the request
    fn first_trigger(&self, request: &str, intents: &[Intent]) -> Option<TriggerMatch> {
        for intent in intents {
            if let Some(name) = intent.trigger() {
                let key = intent
                    .parameter("key")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let name = match name {
                    "key_press" => "key_press",
                    "sprite_click" => "sprite_click",
                    "forever" => "forever",
                    _ => "flag_click",
                };
                return Some(TriggerMatch { name, key });
            }
        }
        self.extractor.extract_trigger(request)
    }

    /// Read a request into intents without generating anything
    #[must_use]
    pub fn parse_intents(&self, request: &str) -> Vec<Intent> {
        self.extractor.parse(request)
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.config.cost_per_1k_tokens)
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Forget every cached program
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    #[must_use]
    pub fn validator(&self) -> &ProgramValidator {
        &self.validator
    }

    /// Backend calls left today
    #[must_use]
    pub fn quota_remaining(&self) -> u32 {
        self.engine.quota_remaining()
    }
}

/// Event hat for a trigger
fn hat_for(trigger: Option<&TriggerMatch>) -> (&'static str, Inputs) {
    let mut inputs = Inputs::new();
    match trigger {
        Some(TriggerMatch {
            name: "key_press",
            key,
        }) => {
            let key = key.clone().unwrap_or_else(|| "space".to_string());
            inputs.insert("KEY_OPTION".to_string(), Value::String(key));
            ("whenKeyPressed", inputs)
        }
        Some(TriggerMatch {
            name: "sprite_click",
            ..
        }) => ("whenClicked", inputs),
        _ => ("whenGreenFlag", inputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hat_mapping() {
        assert_eq!(hat_for(None).0, "whenGreenFlag");

        let key = TriggerMatch {
            name: "key_press",
            key: Some("up arrow".into()),
        };
        let (hat, inputs) = hat_for(Some(&key));
        assert_eq!(hat, "whenKeyPressed");
        assert_eq!(inputs["KEY_OPTION"], "up arrow");

        let click = TriggerMatch {
            name: "sprite_click",
            key: None,
        };
        assert_eq!(hat_for(Some(&click)).0, "whenClicked");

        let forever = TriggerMatch {
            name: "forever",
            key: None,
        };
        assert_eq!(hat_for(Some(&forever)).0, "whenGreenFlag");
    }
}
