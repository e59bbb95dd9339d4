//! Versioned prompt templates and the storage seam behind them.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored revision of a prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,

    /// Monotonically increasing per `id`, starting at 1
    pub version: u32,

    /// Body with named `{placeholder}`s
    pub body: String,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// At most one version per `id` is active
    pub active: bool,

    pub created_at: DateTime<Utc>,
}

/// The write half of an upsert: everything except what storage assigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateUpsert {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Explicit version; `None` means "highest existing + 1"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl TemplateUpsert {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            metadata: serde_json::Map::new(),
            active: true,
            version: None,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Durable template storage.
///
/// `upsert` must be atomic: version assignment, deactivation of sibling
/// versions (when the new row is active) and the insert happen in one
/// transaction.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn upsert(&self, template: TemplateUpsert) -> Result<PromptTemplate, StoreError>;

    /// The highest-versioned active row for `id`.
    async fn active(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError>;

    /// Every stored version of `id`, newest first.
    async fn versions(&self, id: &str) -> Result<Vec<PromptTemplate>, StoreError>;
}
