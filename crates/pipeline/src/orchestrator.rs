//! Generation orchestrator — drives one conversational turn end to end.
//!
//! Screen → compress → render → route → phrase → record. Provider and
//! template failures never reach the caller; they become a fallback reply
//! and an outcome row saying what went wrong.

use crate::compressor::compress;
use crate::templates::TemplateRegistry;
use chrono::Utc;
use replyforge_config::AppConfig;
use replyforge_core::error::{Error, TemplateError};
use replyforge_core::intent::{GenerationRequest, ReplyIntent};
use replyforge_core::outcome::{FALLBACK_PROVIDER, GenerationOutcome, OutcomeStore};
use replyforge_core::provider::ProviderTrace;
use replyforge_core::template::TemplateStore;
use replyforge_core::verdict::{Decision, InjectionVerdict};
use replyforge_providers::ProviderRouter;
use replyforge_security::phrasing::{self, PhrasingConstraint};
use replyforge_security::{InjectionScreen, parse_constraints};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Model name recorded when no backend produced the final text.
const NO_MODEL: &str = "none";

/// Per-turn defaults and canned texts, resolved from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_template_id: String,
    pub default_model: String,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    pub history_token_budget: usize,
    pub max_chars: usize,
    pub default_constraints: Vec<String>,
    pub fallback_text: String,
    pub refusal_text: String,
    pub sanitize_notice: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_template_id: config.templates.default_id.clone(),
            default_model: config.default_model.clone(),
            default_max_tokens: config.default_max_tokens,
            default_temperature: config.default_temperature,
            history_token_budget: config.history_token_budget,
            max_chars: config.phrasing.max_chars,
            default_constraints: config.phrasing.default_constraints.clone(),
            fallback_text: config.fallback.text.clone(),
            refusal_text: config.fallback.refusal.clone(),
            sanitize_notice: config.fallback.sanitize_notice.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The result of one generated turn.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// The audit record, as persisted
    pub outcome: GenerationOutcome,
    /// Every provider attempt made (empty when the router was never reached)
    pub trace: ProviderTrace,
}

/// Why a turn ended on the fallback path.
struct Fallback {
    error: String,
    trace: ProviderTrace,
}

pub struct GenerationOrchestrator {
    screen: InjectionScreen,
    registry: Arc<TemplateRegistry>,
    router: ProviderRouter,
    outcomes: Arc<dyn OutcomeStore>,
    settings: OrchestratorSettings,
}

impl GenerationOrchestrator {
    pub fn new(
        screen: InjectionScreen,
        registry: Arc<TemplateRegistry>,
        router: ProviderRouter,
        outcomes: Arc<dyn OutcomeStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        if router.is_empty() {
            warn!("No providers configured; every generated turn will fall back");
        }
        Self {
            screen,
            registry,
            router,
            outcomes,
            settings,
        }
    }

    /// Wire every component from configuration over one backing store.
    pub async fn from_config<S>(config: &AppConfig, store: Arc<S>) -> Result<Self, Error>
    where
        S: TemplateStore + OutcomeStore + 'static,
    {
        let screen = InjectionScreen::from_config(&config.screen).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let registry = TemplateRegistry::new(
            store.clone(),
            &config.templates.default_id,
            &config.templates.default_body,
        )
        .await?;
        let router = replyforge_providers::build_from_config(config)
            .with_observer(Arc::new(replyforge_providers::TracingObserver));

        Ok(Self::new(
            screen,
            Arc::new(registry),
            router,
            store,
            OrchestratorSettings::from_config(config),
        ))
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one turn.
    ///
    /// Turns that do not ask for generation come back unchanged and leave
    /// no outcome behind. Otherwise the returned intent carries the final
    /// text and a `generation` block.
    pub async fn process(&self, intent: ReplyIntent) -> ReplyIntent {
        if !intent.needs_generation {
            return intent;
        }

        let request = self.request_from_intent(&intent);
        let report = self.generate(request).await;
        intent.with_outcome(&report.outcome)
    }

    /// Resolve an intent's optional fields against the configured defaults.
    pub fn request_from_intent(&self, intent: &ReplyIntent) -> GenerationRequest {
        let request_id = intent
            .request_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        GenerationRequest {
            request_id,
            conversation_id: intent.conversation_id.clone(),
            user_text: intent.user_text.clone(),
            history: intent.history.clone(),
            token_budget: intent.token_budget.unwrap_or(self.settings.history_token_budget),
            template_id: intent
                .template_id
                .clone()
                .unwrap_or_else(|| self.settings.default_template_id.clone()),
            constraints: intent.constraints.clone(),
            model: intent.model.clone().unwrap_or_else(|| self.settings.default_model.clone()),
            max_tokens: intent.max_tokens.unwrap_or(self.settings.default_max_tokens),
            temperature: intent.temperature.unwrap_or(self.settings.default_temperature),
        }
    }

    /// Generate a reply for `request`, record exactly one outcome and return it.
    pub async fn generate(&self, request: GenerationRequest) -> GenerationReport {
        let started = Instant::now();
        let verdict = self.screen.evaluate(&request.user_text);
        let constraints = self.constraints_for(&request);

        let result = if verdict.is_blocked() {
            Err(Fallback {
                error: verdict.reason().to_string(),
                trace: ProviderTrace::default(),
            })
        } else {
            self.generate_normal(&request, &verdict, &constraints).await
        };

        let fallback_used = result.is_err();
        let (final_text, provider, model, error, trace) = match result {
            Ok((text, provider, model, trace)) => (text, provider, model, String::new(), trace),
            Err(fallback) => (
                self.fallback_text(&verdict, &constraints),
                FALLBACK_PROVIDER.to_string(),
                NO_MODEL.to_string(),
                fallback.error,
                fallback.trace,
            ),
        };

        let mut metadata = Map::new();
        metadata.insert("template_id".into(), Value::String(request.template_id.clone()));
        metadata.insert("trace_id".into(), Value::String(request.request_id.clone()));
        metadata.insert("attempts".into(), trace.summary());
        metadata.insert("reason".into(), Value::String(verdict.reason().to_string()));

        let outcome = GenerationOutcome {
            request_id: request.request_id,
            conversation_id: request.conversation_id,
            final_text,
            provider,
            model,
            fallback_used,
            decision: verdict.decision(),
            error,
            latency_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
            metadata,
        };

        info!(
            request_id = %outcome.request_id,
            conversation_id = %outcome.conversation_id,
            provider = %outcome.provider,
            decision = %outcome.decision,
            fallback = outcome.fallback_used,
            attempts = trace.len(),
            latency_ms = outcome.latency_ms,
            "Generation outcome"
        );

        if let Err(e) = self.outcomes.append(&outcome).await {
            warn!(request_id = %outcome.request_id, error = %e, "Failed to persist outcome");
        }

        GenerationReport { outcome, trace }
    }

    /// The allow/sanitize path: compress, render, route, phrase.
    async fn generate_normal(
        &self,
        request: &GenerationRequest,
        verdict: &InjectionVerdict,
        constraints: &[PhrasingConstraint],
    ) -> Result<(String, String, String, ProviderTrace), Fallback> {
        let digest = compress(&request.history, request.token_budget);
        let prompt = self
            .render_prompt(request, &digest, verdict.text())
            .await
            .map_err(|e| Fallback {
                error: e.to_string(),
                trace: ProviderTrace::default(),
            })?;

        let (content, trace) = self
            .router
            .generate(
                &prompt,
                &request.model,
                request.max_tokens,
                request.temperature,
                Some(&request.request_id),
            )
            .await
            .map_err(|e| Fallback {
                error: e.to_string(),
                trace: e.trace(),
            })?;

        let text = phrasing::apply(&content.text, constraints, self.settings.max_chars);
        if text.trim().is_empty() {
            return Err(Fallback {
                error: "empty generation".into(),
                trace,
            });
        }

        Ok((text, content.provider, content.model, trace))
    }

    /// Render the requested template; a missing template falls back to a
    /// literal prompt. Storage failures are returned.
    async fn render_prompt(
        &self,
        request: &GenerationRequest,
        digest: &str,
        message: &str,
    ) -> Result<String, TemplateError> {
        let mut variables = Map::new();
        variables.insert("message".into(), Value::String(message.to_string()));
        variables.insert("history".into(), Value::String(digest.to_string()));
        variables.insert(
            "conversation_id".into(),
            Value::String(request.conversation_id.clone()),
        );

        match self.registry.render(&request.template_id, &variables).await {
            Err(TemplateError::NotFound(id)) => {
                warn!(template_id = %id, "Template not found, using literal prompt");
                Ok(literal_prompt(digest, message))
            }
            other => other,
        }
    }

    fn constraints_for(&self, request: &GenerationRequest) -> Vec<PhrasingConstraint> {
        let names: Vec<&str> = self
            .settings
            .default_constraints
            .iter()
            .chain(&request.constraints)
            .map(String::as_str)
            .collect();
        parse_constraints(&names)
    }

    fn fallback_text(&self, verdict: &InjectionVerdict, constraints: &[PhrasingConstraint]) -> String {
        // Trimmed so the length cap always keeps a visible character.
        let raw = match verdict.decision() {
            Decision::Block => self.settings.refusal_text.trim().to_string(),
            Decision::Sanitize => format!(
                "{} {}",
                self.settings.fallback_text.trim(),
                self.settings.sanitize_notice.trim()
            )
            .trim()
            .to_string(),
            Decision::Allow => self.settings.fallback_text.trim().to_string(),
        };
        phrasing::apply(&raw, constraints, self.settings.max_chars)
    }
}

fn literal_prompt(digest: &str, message: &str) -> String {
    if digest.is_empty() {
        format!("User message:\n{message}\n\nReply:")
    } else {
        format!("Conversation so far:\n{digest}\n\nUser message:\n{message}\n\nReply:")
    }
}
