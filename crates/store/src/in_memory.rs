//! In-memory backend — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use replyforge_core::error::StoreError;
use replyforge_core::outcome::{GenerationOutcome, OutcomeStore};
use replyforge_core::template::{PromptTemplate, TemplateStore, TemplateUpsert};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keeps templates and outcomes in process memory.
/// Same semantics as the SQLite store, nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    templates: RwLock<HashMap<String, Vec<PromptTemplate>>>,
    outcomes: RwLock<Vec<GenerationOutcome>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored outcomes.
    pub async fn outcome_count(&self) -> usize {
        self.outcomes.read().await.len()
    }
}

#[async_trait]
impl TemplateStore for InMemoryStore {
    async fn upsert(&self, template: TemplateUpsert) -> Result<PromptTemplate, StoreError> {
        // The write guard covers the whole upsert, standing in for a transaction.
        let mut templates = self.templates.write().await;
        let rows = templates.entry(template.id.clone()).or_default();

        let version = match template.version {
            Some(v) => v,
            None => {
                let latest = rows.iter().map(|t| t.version).max().unwrap_or(0);
                latest.checked_add(1).ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "template '{}' has no version left after {latest}",
                        template.id
                    ))
                })?
            }
        };
        if rows.iter().any(|t| t.version == version) {
            return Err(StoreError::Conflict(format!(
                "template '{}' version {version} already exists",
                template.id
            )));
        }

        if template.active {
            rows.iter_mut().for_each(|t| t.active = false);
        }

        let stored = PromptTemplate {
            id: template.id,
            version,
            body: template.body,
            metadata: template.metadata,
            active: template.active,
            created_at: Utc::now(),
        };
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn active(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError> {
        let templates = self.templates.read().await;
        Ok(templates.get(id).and_then(|rows| {
            rows.iter()
                .filter(|t| t.active)
                .max_by_key(|t| t.version)
                .cloned()
        }))
    }

    async fn versions(&self, id: &str) -> Result<Vec<PromptTemplate>, StoreError> {
        let templates = self.templates.read().await;
        let mut rows = templates.get(id).cloned().unwrap_or_default();
        rows.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(rows)
    }
}

#[async_trait]
impl OutcomeStore for InMemoryStore {
    async fn append(&self, outcome: &GenerationOutcome) -> Result<(), StoreError> {
        self.outcomes.write().await.push(outcome.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<GenerationOutcome>, StoreError> {
        let outcomes = self.outcomes.read().await;
        Ok(outcomes.iter().rev().take(limit).cloned().collect())
    }
}
