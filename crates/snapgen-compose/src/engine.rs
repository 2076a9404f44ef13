//! Generative engine
//!
//! Turns free text into a validated program through a backend:
//! 1. pick a model tier
//! 2. build the prompt
//! 3. call the backend (quota-checked, up to `max_attempts` times)
//! 4. cut out the JSON, parse it, run it through the validator
//!
//! [`GenerativeEngine::generate`] never fails: when every attempt is
//! spent it returns the error-marker program instead.

use std::sync::Arc;

use serde_json::Value;
use snapgen_program::{truncate_chars, GeneratedProgram, KnowledgeBase};
use snapgen_validate::ProgramValidator;

use crate::backend::{extract_json, BackendRequest, GenerativeBackend};
use crate::config::{GenerationConfig, GenerationOptions};
use crate::error::GenerativeError;
use crate::metrics::GenerationMetrics;
use crate::prompt::{select_tier, PromptBuilder};
use crate::quota::DailyQuota;

/// Backend-driven program generator
#[derive(Debug)]
pub struct GenerativeEngine {
    backend: Arc<dyn GenerativeBackend>,
    validator: ProgramValidator,
    prompts: PromptBuilder,
    quota: DailyQuota,
    config: GenerationConfig,
    metrics: Arc<GenerationMetrics>,
}

impl GenerativeEngine {
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        knowledge: Arc<KnowledgeBase>,
        config: GenerationConfig,
        metrics: Arc<GenerationMetrics>,
    ) -> Self {
        Self {
            backend,
            prompts: PromptBuilder::new(&knowledge),
            validator: ProgramValidator::new(knowledge),
            quota: DailyQuota::new(config.daily_quota),
            config,
            metrics,
        }
    }

    /// Generate a program, falling back to the error marker
    pub async fn generate(&self, request: &str, options: &GenerationOptions) -> GeneratedProgram {
        match self.try_generate(request, options).await {
            Ok(program) => program,
            Err(e) => {
                tracing::warn!(
                    request = %truncate_chars(request, 50),
                    error = %e,
                    "generative path failed, returning error program"
                );
                self.metrics.record_failure();
                GeneratedProgram::error_fallback(&e.to_string(), request)
            }
        }
    }

    /// Generate a program or report why not
    ///
    /// # Errors
    /// Returns the quota error as soon as the budget runs out, a
    /// non-retryable error immediately, or `RetriesExhausted` after the last
    /// failed attempt.
    pub async fn try_generate(
        &self,
        request: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedProgram, GenerativeError> {
        let tier = select_tier(request, self.config.complexity_word_threshold);
        let backend_request = BackendRequest {
            prompt: self.prompts.build(request, options),
            tier,
        };
        let words = request.split_whitespace().count();
        let attempts = self.config.max_attempts.max(1);

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            self.quota.try_acquire()?;
            self.metrics.record_backend_call(words);

            match self.attempt(&backend_request).await {
                Ok(program) => {
                    tracing::info!(
                        backend = self.backend.name(),
                        ?tier,
                        attempt,
                        blocks = program.block_count(),
                        "generated program"
                    );
                    return Ok(program);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempt, attempts, error = %e, "generation attempt failed");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }

        Err(GenerativeError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    async fn attempt(&self, request: &BackendRequest) -> Result<GeneratedProgram, GenerativeError> {
        let text = self.backend.generate(request).await?;
        let body = extract_json(&text)?;
        let value: Value = serde_json::from_str(body)
            .map_err(|e| GenerativeError::MalformedOutput(e.to_string()))?;
        let program = self
            .validator
            .validate_value(&value)
            .map_err(|e| GenerativeError::Rejected(e.to_string()))?;
        if program.is_error() {
            return Err(GenerativeError::Rejected(
                "backend returned an error marker".to_string(),
            ));
        }
        Ok(program)
    }

    /// Calls left in today's budget
    #[inline]
    #[must_use]
    pub fn quota_remaining(&self) -> u32 {
        self.quota.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    struct Replies {
        queue: Mutex<VecDeque<Result<String, GenerativeError>>>,
        prompts: Mutex<Vec<BackendRequest>>,
    }

    #[async_trait]
    impl GenerativeBackend for Replies {
        async fn generate(&self, request: &BackendRequest) -> Result<String, GenerativeError> {
            self.prompts.lock().push(request.clone());
            self.queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok("nothing".to_string()))
        }

        fn name(&self) -> &str {
            "replies"
        }
    }

    const GOOD: &str = r#"```json
{"command": "create_blocks", "payload": {"target_sprite": "Sprite", "scripts": [
  {"script_id": "script_001", "position": {"x": 50, "y": 50}, "blocks": [
    {"block_id": "b0", "opcode": "whenGreenFlag", "category": "control", "inputs": {}, "is_hat_block": true, "next": "b1"},
    {"block_id": "b1", "opcode": "turn", "category": "motion", "inputs": {"DEGREES": 10}, "is_hat_block": false, "next": null}
  ]}]}}
```"#;

    fn engine(replies: Arc<Replies>, config: GenerationConfig) -> GenerativeEngine {
        GenerativeEngine::new(
            replies,
            Arc::new(KnowledgeBase::builtin().unwrap()),
            config,
            Arc::new(GenerationMetrics::new()),
        )
    }

    #[tokio::test]
    async fn second_attempt_can_succeed() {
        let replies = Arc::new(Replies::default());
        replies.queue.lock().push_back(Ok("not json at all".into()));
        replies.queue.lock().push_back(Ok(GOOD.into()));

        let program = engine(replies.clone(), GenerationConfig::default())
            .generate("draw a spiral", &GenerationOptions::default())
            .await;
        assert!(!program.is_error());
        assert_eq!(program.block_count(), 2);
        assert_eq!(replies.prompts.lock().len(), 2);
    }

    #[tokio::test]
    async fn invalid_program_is_rejected_then_fallback() {
        let bad = GOOD.replace("\"turn\"", "\"launchRocket\"");
        let replies = Arc::new(Replies::default());
        replies.queue.lock().push_back(Ok(bad.clone()));
        replies.queue.lock().push_back(Ok(bad));

        let program = engine(replies, GenerationConfig::default())
            .generate("draw a spiral", &GenerationOptions::default())
            .await;
        assert!(program.is_error());
        let error = program.payload.error.unwrap();
        assert!(error.contains("all 2 attempts failed"), "{error}");
        assert!(error.contains("launchRocket"), "{error}");
    }

    #[tokio::test]
    async fn non_retryable_error_stops_early() {
        let replies = Arc::new(Replies::default());
        replies
            .queue
            .lock()
            .push_back(Err(GenerativeError::NotConfigured("no key".into())));

        let err = engine(replies.clone(), GenerationConfig::default())
            .try_generate("draw", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerativeError::NotConfigured(_)));
        assert_eq!(replies.prompts.lock().len(), 1);
    }

    #[tokio::test]
    async fn quota_blocks_backend_calls() {
        let replies = Arc::new(Replies::default());
        let e = engine(
            replies.clone(),
            GenerationConfig::default().with_daily_quota(1),
        );
        let err = e.try_generate("draw a spiral", &GenerationOptions::default()).await.unwrap_err();
        // first attempt consumed the only call, second hit the limit
        assert!(matches!(err, GenerativeError::QuotaExceeded { limit: 1 }));
        assert_eq!(replies.prompts.lock().len(), 1);
        assert_eq!(e.quota_remaining(), 0);
    }

    #[tokio::test]
    async fn logic_requests_use_heavy_tier() {
        let replies = Arc::new(Replies::default());
        replies.queue.lock().push_back(Ok(GOOD.into()));
        engine(replies.clone(), GenerationConfig::default())
            .generate("if touching the edge then spin", &GenerationOptions::default())
            .await;
        assert_eq!(
            replies.prompts.lock()[0].tier,
            crate::prompt::ModelTier::Heavy
        );
    }
}
