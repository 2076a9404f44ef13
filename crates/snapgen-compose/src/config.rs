//! Generation configuration
//!
//! Defaults match a light/heavy model pair on a hosted generateContent API.

use serde::{Deserialize, Serialize};

/// Knobs for the generative path and the pattern matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Backend attempts per request
    pub max_attempts: u32,
    /// Backend calls allowed per UTC day
    pub daily_quota: u32,
    /// Model for short, simple requests
    pub light_model: String,
    /// Model for long or logic-heavy requests
    pub heavy_model: String,
    /// Word count above which the heavy model is used
    pub complexity_word_threshold: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    /// Per-call HTTP timeout
    pub request_timeout_secs: u64,
    /// Base URL of the generateContent API
    pub api_base: String,
    /// API key; usually supplied through the environment
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Minimum similarity for a fuzzy pattern match
    pub match_threshold: f64,
    /// Estimated cost per 1000 tokens, for metrics only
    pub cost_per_1k_tokens: f64,
}

impl GenerationConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With attempt budget
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// With daily quota
    #[inline]
    #[must_use]
    pub fn with_daily_quota(mut self, quota: u32) -> Self {
        self.daily_quota = quota;
        self
    }

    /// With API key
    #[inline]
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            daily_quota: 1000,
            light_model: "gemini-1.5-flash".to_string(),
            heavy_model: "gemini-1.5-pro".to_string(),
            complexity_word_threshold: 15,
            temperature: 0.1,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 2048,
            request_timeout_secs: 30,
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            match_threshold: 0.6,
            cost_per_1k_tokens: 0.0001,
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached programs
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// How elaborate generated programs should be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Complexity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    /// Guidance line for the prompt
    #[must_use]
    pub const fn guidance(&self) -> &'static str {
        match self {
            Self::Beginner => "keep it to a few simple blocks",
            Self::Intermediate => "up to about ten blocks, simple loops allowed",
            Self::Advanced => "loops, conditionals and variables are welcome",
        }
    }
}

impl std::str::FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown complexity '{other}'")),
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub target_sprite: String,
    #[serde(default)]
    pub complexity: Complexity,
}

impl GenerationOptions {
    #[must_use]
    pub fn new(target_sprite: impl Into<String>) -> Self {
        Self {
            target_sprite: target_sprite.into(),
            complexity: Complexity::default(),
        }
    }

    /// With complexity
    #[inline]
    #[must_use]
    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::new(snapgen_program::DEFAULT_TARGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config: GenerationConfig =
            serde_json::from_str(r#"{"max_attempts": 3, "light_model": "tiny"}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.light_model, "tiny");
        assert_eq!(config.daily_quota, 1000);
        assert_eq!(config.heavy_model, "gemini-1.5-pro");
    }

    #[test]
    fn attempts_never_zero() {
        assert_eq!(GenerationConfig::new().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn complexity_parses_case_insensitively() {
        assert_eq!("Advanced".parse::<Complexity>(), Ok(Complexity::Advanced));
        assert!("expert".parse::<Complexity>().is_err());
        assert_eq!(GenerationOptions::default().target_sprite, "Sprite");
    }

    #[test]
    fn api_key_not_serialized() {
        let json = serde_json::to_string(&GenerationConfig::new().with_api_key("secret")).unwrap();
        assert!(!json.contains("secret"));
    }
}
