//! The conversational turn as exchanged with upstream collaborators, and the
//! per-request generation parameters derived from it.

use crate::outcome::GenerationOutcome;
use crate::verdict::Decision;
use serde::{Deserialize, Serialize};

/// Template used when a turn does not name one.
pub const DEFAULT_TEMPLATE_ID: &str = "telegram_default";

/// A conversational turn as a flat property bag.
///
/// Unknown properties are preserved in `extra` so the turn handed back to the
/// caller carries everything it came with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default)]
    pub conversation_id: String,

    /// When false the turn passes through with its `text` untouched
    #[serde(default, alias = "generate")]
    pub needs_generation: bool,

    /// The reply text; replaced by the final text after generation
    #[serde(default)]
    pub text: String,

    /// Raw inbound user message
    #[serde(default)]
    pub user_text: String,

    /// Prior transcript entries, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Token budget for the history digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<usize>,

    /// Phrasing constraint names (e.g. `NO_URLS`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,

    /// Filled in once generation has run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationMetadata>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ReplyIntent {
    /// A new intent with the outcome applied; `self` is left untouched.
    pub fn with_outcome(&self, outcome: &GenerationOutcome) -> Self {
        Self {
            request_id: Some(outcome.request_id.clone()),
            text: outcome.final_text.clone(),
            generation: Some(GenerationMetadata::from(outcome)),
            ..self.clone()
        }
    }
}

/// The metadata block attached to a generated turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub provider: String,
    pub model: String,
    pub fallback_used: bool,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&GenerationOutcome> for GenerationMetadata {
    fn from(outcome: &GenerationOutcome) -> Self {
        Self {
            provider: outcome.provider.clone(),
            model: outcome.model.clone(),
            fallback_used: outcome.fallback_used,
            decision: outcome.decision,
            error: (!outcome.error.is_empty()).then(|| outcome.error.clone()),
        }
    }
}

/// Everything one generation request needs, owned by the orchestrator for
/// the duration of a single call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub request_id: String,
    pub conversation_id: String,
    pub user_text: String,
    pub history: Vec<String>,
    pub token_budget: usize,
    pub template_id: String,
    pub constraints: Vec<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(
        request_id: impl Into<String>,
        conversation_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            conversation_id: conversation_id.into(),
            user_text: user_text.into(),
            history: Vec::new(),
            token_budget: 512,
            template_id: DEFAULT_TEMPLATE_ID.into(),
            constraints: Vec::new(),
            model: "gpt-4o-mini".into(),
            max_tokens: 512,
            temperature: 0.7,
        }
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = token_budget;
        self
    }
}
