//! Audit records for completed generation requests.

use crate::error::StoreError;
use crate::verdict::Decision;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider name recorded when no backend produced the final text.
pub const FALLBACK_PROVIDER: &str = "fallback";

/// One immutable audit row per generated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub request_id: String,
    pub conversation_id: String,
    pub final_text: String,
    pub provider: String,
    pub model: String,
    pub fallback_used: bool,
    pub decision: Decision,
    /// Empty on full success
    #[serde(default)]
    pub error: String,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        !self.fallback_used && self.error.is_empty()
    }
}

/// Append-only outcome storage.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn append(&self, outcome: &GenerationOutcome) -> Result<(), StoreError>;

    /// The most recent outcomes, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<GenerationOutcome>, StoreError>;
}
