//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider turns a rendered prompt into generated text. Backends are
//! interchangeable; the router tries them in configured order and records
//! every attempt in a [`ProviderTrace`].

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single generation call handed to a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The fully rendered prompt
    pub prompt: String,

    /// The model to use (e.g., "gpt-4o-mini", "claude-3-5-haiku-latest")
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Correlation id propagated into the generated content's metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// Text produced by one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub text: String,

    /// Which provider produced the text
    pub provider: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Provider-specific metadata; carries `trace_id` when one was supplied
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GeneratedContent {
    pub fn new(text: impl Into<String>, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            model: model.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// The correlation id, if one was attached.
    pub fn trace_id(&self) -> Option<&str> {
        self.metadata.get("trace_id").and_then(|v| v.as_str())
    }
}

/// One call to one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub success: bool,
    pub elapsed_ms: u64,
    /// Empty on success
    #[serde(default)]
    pub error: String,
}

impl ProviderAttempt {
    pub fn succeeded(provider: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            provider: provider.into(),
            success: true,
            elapsed_ms: elapsed.as_millis() as u64,
            error: String::new(),
        }
    }

    pub fn failed(provider: impl Into<String>, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            success: false,
            elapsed_ms: elapsed.as_millis() as u64,
            error: error.into(),
        }
    }
}

/// Ordered record of every attempt made for one request.
///
/// Built once from the attempts the router collected; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderTrace {
    attempts: Vec<ProviderAttempt>,
}

impl ProviderTrace {
    pub fn attempts(&self) -> &[ProviderAttempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Whether the last attempt succeeded.
    pub fn succeeded(&self) -> bool {
        self.attempts.last().is_some_and(|a| a.success)
    }

    /// Compact JSON summary for audit metadata.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.attempts
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "provider": a.provider,
                        "success": a.success,
                        "elapsed_ms": a.elapsed_ms,
                    })
                })
                .collect(),
        )
    }
}

impl From<Vec<ProviderAttempt>> for ProviderTrace {
    fn from(attempts: Vec<ProviderAttempt>) -> Self {
        Self { attempts }
    }
}

/// The core Provider trait.
///
/// Every backend (OpenAI-compatible, Anthropic, test doubles) implements this
/// trait. The router calls `generate()` without knowing which backend it is
/// talking to.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Generate text for a rendered prompt.
    async fn generate(&self, request: ProviderRequest) -> std::result::Result<GeneratedContent, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Telemetry hook invoked once per provider attempt, whatever the outcome.
pub trait AttemptObserver: Send + Sync {
    fn on_attempt(&self, attempt: &ProviderAttempt);
}

impl<F> AttemptObserver for F
where
    F: Fn(&ProviderAttempt) + Send + Sync,
{
    fn on_attempt(&self, attempt: &ProviderAttempt) {
        self(attempt)
    }
}
