//! Structured intents
//!
//! An [`Intent`] is the structured reading of one clause of a user request:
//! what should happen, on which trigger, to whom, with which parameters.
//! Intents are built once by the extractor and never mutated afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who an intent acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    /// The target sprite
    #[default]
    Sprite,
    /// The stage / backdrop
    Stage,
}

impl Subject {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sprite => "sprite",
            Self::Stage => "stage",
        }
    }
}

/// One structured reading of a request clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    action: String,
    trigger: Option<String>,
    subject: Subject,
    parameters: IndexMap<String, Value>,
    modifiers: Vec<String>,
    confidence: f64,
    raw_text: String,
}

impl Intent {
    /// Start an intent for an action recognized in `raw_text`
    #[must_use]
    pub fn new(action: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            trigger: None,
            subject: Subject::default(),
            parameters: IndexMap::new(),
            modifiers: Vec::new(),
            confidence: 0.5,
            raw_text: raw_text.into(),
        }
    }

    /// With trigger name
    #[inline]
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// With subject
    #[inline]
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    /// With a named parameter
    #[inline]
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// With modifiers
    #[inline]
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Vec<String>) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// With confidence, clamped to `[0, 1]`
    #[inline]
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    #[inline]
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[inline]
    #[must_use]
    pub fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn subject(&self) -> Subject {
        self.subject
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    /// Look up a single parameter
    #[inline]
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    #[inline]
    #[must_use]
    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }

    /// Whether a modifier was detected
    #[inline]
    #[must_use]
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    #[inline]
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    #[inline]
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }
}
