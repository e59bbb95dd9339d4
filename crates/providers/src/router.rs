//! Provider router — ordered failover chain with per-provider deadlines.
//!
//! Providers are tried in configured order. The first success wins; every
//! failure (error or deadline expiry) is recorded in the trace and the next
//! provider is tried.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use replyforge_config::{AppConfig, ProviderKind};
use replyforge_core::error::{ProviderError, RouterError};
use replyforge_core::provider::{
    AttemptObserver, GeneratedContent, Provider, ProviderAttempt, ProviderRequest, ProviderTrace,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Deadline applied when a provider is added without one.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// A single entry in the chain.
struct RouterEntry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

/// Tries an ordered list of backends until one succeeds.
#[derive(Default)]
pub struct ProviderRouter {
    chain: Vec<RouterEntry>,
    observer: Option<Arc<dyn AttemptObserver>>,
}

impl ProviderRouter {
    /// Create a router with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the end of the chain with its own deadline.
    pub fn add(mut self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.chain.push(RouterEntry { provider, timeout });
        self
    }

    /// Add a provider with [`DEFAULT_PROVIDER_TIMEOUT`].
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, DEFAULT_PROVIDER_TIMEOUT)
    }

    /// Invoke `observer` once per attempt, success or failure.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Provider names in the order they are tried.
    pub fn provider_names(&self) -> Vec<&str> {
        self.chain.iter().map(|e| e.provider.name()).collect()
    }

    /// Generate text, failing over through the chain.
    ///
    /// Returns the first successful content together with the trace of every
    /// attempt made. A blank completion counts as a failed attempt.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        trace_id: Option<&str>,
    ) -> Result<(GeneratedContent, ProviderTrace), RouterError> {
        if self.chain.is_empty() {
            return Err(RouterError::NoProvidersConfigured);
        }

        let request = ProviderRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
            max_tokens,
            temperature,
            trace_id: trace_id.map(String::from),
        };

        let mut attempts = Vec::with_capacity(self.chain.len());
        let mut last_error = ProviderError::NotConfigured("No providers in chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let provider_name = entry.provider.name().to_string();

            info!(
                provider = %provider_name,
                attempt = i + 1,
                total = self.chain.len(),
                trace_id = trace_id.unwrap_or_default(),
                "Router: trying provider"
            );

            let started = Instant::now();
            let result =
                match tokio::time::timeout(entry.timeout, entry.provider.generate(request.clone()))
                    .await
                {
                    Ok(Ok(content)) if content.text.trim().is_empty() => {
                        Err(ProviderError::EmptyCompletion)
                    }
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}ms",
                        provider_name,
                        entry.timeout.as_millis()
                    ))),
                };
            let elapsed = started.elapsed();

            match result {
                Ok(mut content) => {
                    let attempt = ProviderAttempt::succeeded(&provider_name, elapsed);
                    self.observe(&attempt);
                    attempts.push(attempt);

                    if let Some(trace_id) = trace_id {
                        content
                            .metadata
                            .entry("trace_id")
                            .or_insert_with(|| trace_id.into());
                    }
                    return Ok((content, ProviderTrace::from(attempts)));
                }
                Err(e) => {
                    debug!(
                        provider = %provider_name,
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Router: provider failed, trying next"
                    );
                    let attempt = ProviderAttempt::failed(&provider_name, elapsed, e.to_string());
                    self.observe(&attempt);
                    attempts.push(attempt);
                    last_error = e;
                }
            }
        }

        Err(RouterError::AllProvidersExhausted {
            last_error,
            trace: ProviderTrace::from(attempts),
        })
    }

    /// Health of every provider, in chain order. Errors count as unhealthy.
    pub async fn health(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.chain.len());
        for entry in &self.chain {
            let healthy = matches!(
                tokio::time::timeout(entry.timeout, entry.provider.health_check()).await,
                Ok(Ok(true))
            );
            report.push((entry.provider.name().to_string(), healthy));
        }
        report
    }

    fn observe(&self, attempt: &ProviderAttempt) {
        if let Some(observer) = &self.observer {
            observer.on_attempt(attempt);
        }
    }
}

/// Build the failover chain from configuration, preserving order.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new();

    for provider_config in &config.providers {
        let api_key = config.api_key_for(provider_config);
        let timeout = Duration::from_secs(provider_config.timeout_secs);

        let provider: Arc<dyn Provider> = match provider_config.kind {
            ProviderKind::Anthropic => {
                let mut p = AnthropicProvider::new(&api_key).with_name(&provider_config.name);
                if let Some(url) = &provider_config.api_url {
                    p = p.with_base_url(url);
                }
                Arc::new(p)
            }
            ProviderKind::OpenAiCompat => {
                let base_url = provider_config
                    .api_url
                    .clone()
                    .unwrap_or_else(|| default_base_url(&provider_config.name));
                Arc::new(OpenAiCompatProvider::new(
                    &provider_config.name,
                    base_url,
                    api_key,
                ))
            }
        };

        router = router.add(provider, timeout);
    }

    router
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::observer::TracingObserver;
    use replyforge_config::ProviderConfig;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A mock provider that always fails.
    struct FailingProvider {
        name: String,
        error: ProviderError,
        call_count: Mutex<usize>,
    }

    impl FailingProvider {
        fn new(name: &str, error: ProviderError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _request: ProviderRequest) -> Result<GeneratedContent, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }

        async fn health_check(&self) -> Result<bool, ProviderError> {
            Err(self.error.clone())
        }
    }

    /// A mock provider that always succeeds with a fixed reply.
    struct SuccessProvider {
        name: String,
        reply: String,
        call_count: Mutex<usize>,
    }

    impl SuccessProvider {
        fn new(name: &str) -> Self {
            Self::replying(name, "success")
        }

        fn replying(name: &str, reply: &str) -> Self {
            Self {
                name: name.into(),
                reply: reply.into(),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for SuccessProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, request: ProviderRequest) -> Result<GeneratedContent, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(GeneratedContent::new(&self.reply, &self.name, request.model))
        }
    }

    /// A mock provider that hangs forever (for deadline testing).
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn generate(&self, _request: ProviderRequest) -> Result<GeneratedContent, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Network("unreachable".into()))
        }
    }

    async fn run(router: &ProviderRouter) -> Result<(GeneratedContent, ProviderTrace), RouterError> {
        router.generate("hello", "test-model", 64, 0.7, Some("trace-1")).await
    }

    #[tokio::test]
    async fn first_provider_succeeds() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = ProviderRouter::new()
            .add_default(p1.clone())
            .add_default(p2.clone());

        let (content, trace) = run(&router).await.unwrap();
        assert_eq!(content.text, "success");
        assert_eq!(content.provider, "primary");
        assert_eq!(trace.len(), 1);
        assert!(trace.succeeded());

        // Only the first provider should be called
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_on_failure() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::ApiError {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = ProviderRouter::new()
            .add_default(p1.clone())
            .add_default(p2.clone());

        let (content, trace) = run(&router).await.unwrap();
        assert_eq!(content.provider, "secondary");

        let attempts = trace.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].provider, "primary");
        assert!(!attempts[0].success);
        assert!(attempts[0].error.contains("500"));
        assert_eq!(attempts[1].provider, "secondary");
        assert!(attempts[1].success);
        assert!(attempts[1].error.is_empty());

        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn all_providers_fail() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::Network("conn refused".into()),
        ));
        let p2 = Arc::new(FailingProvider::new(
            "secondary",
            ProviderError::AuthenticationFailed("bad key".into()),
        ));

        let router = ProviderRouter::new()
            .add_default(p1.clone())
            .add_default(p2.clone());

        match run(&router).await.unwrap_err() {
            RouterError::AllProvidersExhausted { last_error, trace } => {
                // Last error should be from the last provider
                assert!(matches!(last_error, ProviderError::AuthenticationFailed(_)));
                assert_eq!(trace.len(), 2);
                assert!(!trace.succeeded());
            }
            other => panic!("Expected AllProvidersExhausted, got: {other:?}"),
        }

        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn deadline_triggers_failover() {
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = ProviderRouter::new()
            .add(Arc::new(HangingProvider), Duration::from_millis(50))
            .add_default(p2.clone());

        let (content, trace) = run(&router).await.unwrap();
        assert_eq!(content.provider, "secondary");
        assert!(trace.attempts()[0].error.contains("timed out"));
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn blank_completion_counts_as_failure() {
        let blank = Arc::new(SuccessProvider::replying("blank", "   \n"));
        let good = Arc::new(SuccessProvider::new("good"));

        let router = ProviderRouter::new().add_default(blank).add_default(good);

        let (content, trace) = run(&router).await.unwrap();
        assert_eq!(content.provider, "good");
        assert!(trace.attempts()[0].error.contains("empty completion"));
    }

    #[tokio::test]
    async fn empty_chain_returns_no_providers_configured() {
        let router = ProviderRouter::new();
        assert!(matches!(
            run(&router).await.unwrap_err(),
            RouterError::NoProvidersConfigured
        ));
    }

    #[tokio::test]
    async fn trace_id_is_attached_to_content() {
        let router = ProviderRouter::new().add_default(Arc::new(SuccessProvider::new("p")));
        let (content, _) = run(&router).await.unwrap();
        assert_eq!(content.trace_id(), Some("trace-1"));

        let (content, _) = router.generate("hi", "m", 8, 0.0, None).await.unwrap();
        assert!(content.trace_id().is_none());
    }

    #[tokio::test]
    async fn observer_sees_every_attempt() {
        let seen: Arc<Mutex<Vec<(String, bool)>>> = Arc::default();
        let sink = seen.clone();
        let observer = move |a: &ProviderAttempt| {
            sink.lock().unwrap().push((a.provider.clone(), a.success));
        };

        let router = ProviderRouter::new()
            .add_default(Arc::new(FailingProvider::new(
                "a",
                ProviderError::Network("down".into()),
            )))
            .add_default(Arc::new(FailingProvider::new(
                "b",
                ProviderError::Network("down".into()),
            )))
            .with_observer(Arc::new(observer));

        assert!(run(&router).await.is_err());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [("a".to_string(), false), ("b".to_string(), false)]
        );
    }

    /// Counts WARN events.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn failed_attempt_is_warned_once_with_tracing_observer() {
        use tracing_subscriber::layer::SubscriberExt;

        let warns = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warns.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let router = ProviderRouter::new()
            .add_default(Arc::new(FailingProvider::new(
                "a",
                ProviderError::Network("down".into()),
            )))
            .add_default(Arc::new(SuccessProvider::new("b")))
            .with_observer(Arc::new(TracingObserver));

        assert!(run(&router).await.is_ok());
        assert_eq!(warns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn health_reports_each_provider() {
        let router = ProviderRouter::new()
            .add_default(Arc::new(FailingProvider::new(
                "bad",
                ProviderError::Network("down".into()),
            )))
            .add_default(Arc::new(SuccessProvider::new("good")));

        let report = router.health().await;
        assert_eq!(report, vec![("bad".to_string(), false), ("good".to_string(), true)]);
    }

    #[test]
    fn build_from_config_preserves_order() {
        let mut config = AppConfig::default();
        config.providers = vec![
            ProviderConfig {
                name: "claude".into(),
                kind: ProviderKind::Anthropic,
                api_key: Some("k".into()),
                api_url: None,
                timeout_secs: 5,
            },
            ProviderConfig {
                name: "ollama".into(),
                kind: ProviderKind::OpenAiCompat,
                api_key: None,
                api_url: None,
                timeout_secs: 60,
            },
        ];

        let router = build_from_config(&config);
        assert_eq!(router.provider_names(), vec!["claude", "ollama"]);
    }

    #[test]
    fn build_from_default_config() {
        let router = build_from_config(&AppConfig::default());
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }
}
