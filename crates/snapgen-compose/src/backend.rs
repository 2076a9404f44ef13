//! Generative backend abstraction
//!
//! [`GenerativeBackend`] is the seam between the engine and a hosted
//! language model. [`HttpBackend`] talks to a generateContent-style HTTP
//! API; tests substitute scripted backends.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::GenerationConfig;
use crate::error::GenerativeError;
use crate::prompt::ModelTier;

/// One backend call
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub prompt: String,
    pub tier: ModelTier,
}

/// Text generation service
#[async_trait]
pub trait GenerativeBackend: Send + Sync + std::fmt::Debug {
    /// Return the raw model text for a prompt
    async fn generate(&self, request: &BackendRequest) -> Result<String, GenerativeError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// HTTP generateContent client
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpBackend {
    /// Build a client with the configured timeout
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(config: GenerationConfig) -> Result<Self, GenerativeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerativeError::Backend(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Light => &self.config.light_model,
            ModelTier::Heavy => &self.config.heavy_model,
        }
    }

    fn body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "topP": self.config.top_p,
                "topK": self.config.top_k,
                "maxOutputTokens": self.config.max_output_tokens,
            }
        })
    }
}

#[async_trait]
impl GenerativeBackend for HttpBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<String, GenerativeError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GenerativeError::NotConfigured("no API key set".to_string()))?;

        let model = self.model(request.tier);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model
        );
        tracing::debug!(model, prompt_chars = request.prompt.len(), "calling generative backend");

        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .json(&self.body(&request.prompt))
            .send()
            .await
            .map_err(|e| GenerativeError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerativeError::Backend(format!(
                "HTTP {status}: {}",
                snapgen_program::truncate_chars(&text, 200)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GenerativeError::MalformedOutput(e.to_string()))?;
        candidate_text(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// First candidate's text from a generateContent response
fn candidate_text(body: &Value) -> Result<String, GenerativeError> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerativeError::MalformedOutput("response has no candidate text".into()))
}

/// Cut the JSON object out of model text
///
/// Strips markdown code fences, then keeps everything from the first `{`
/// to the last `}`.
///
/// # Errors
/// Returns error if no braces are present.
pub fn extract_json(text: &str) -> Result<&str, GenerativeError> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
        body = body.strip_suffix("```").unwrap_or(body);
    }
    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&body[s..=e]),
        _ => Err(GenerativeError::MalformedOutput(
            "no JSON object in backend output".into(),
        )),
    }
}
