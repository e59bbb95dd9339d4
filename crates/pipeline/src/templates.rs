//! Template registry: versioned prompt templates with a read-through cache.
//!
//! Storage is the source of truth. The cache holds the active version per id
//! and is kept consistent on every write that goes through the registry.

use regex_lite::{Captures, Regex};
use replyforge_core::error::TemplateError;
use replyforge_core::template::{PromptTemplate, TemplateStore, TemplateUpsert};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern compiles")
});

/// Versioned prompt templates over a [`TemplateStore`].
///
/// Cache fills on a miss hold `fill_gate` for reading and writes through the
/// registry hold it exclusively, so a fill can never overwrite a newer
/// version with a snapshot taken before the write.
pub struct TemplateRegistry {
    store: Arc<dyn TemplateStore>,
    cache: Mutex<HashMap<String, PromptTemplate>>,
    fill_gate: RwLock<()>,
}

impl TemplateRegistry {
    /// Create a registry, seeding `default_id` with `default_body` when it
    /// has no active version yet.
    pub async fn new(
        store: Arc<dyn TemplateStore>,
        default_id: &str,
        default_body: &str,
    ) -> Result<Self, TemplateError> {
        let registry = Self::without_seed(store);

        if registry.get_template(default_id).await?.is_none() {
            let mut metadata = Map::new();
            metadata.insert("seeded".into(), Value::Bool(true));
            let seeded = registry
                .upsert_template(TemplateUpsert::new(default_id, default_body).with_metadata(metadata))
                .await?;
            info!(template_id = %seeded.id, version = seeded.version, "Seeded default template");
        }

        Ok(registry)
    }

    /// Create a registry without touching storage.
    pub fn without_seed(store: Arc<dyn TemplateStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            fill_gate: RwLock::new(()),
        }
    }

    /// Store a new template version and update the cache.
    pub async fn upsert_template(
        &self,
        template: TemplateUpsert,
    ) -> Result<PromptTemplate, TemplateError> {
        let _exclusive = self.fill_gate.write().await;
        let stored = self.store.upsert(template).await?;

        let mut cache = self.cache();
        if stored.active {
            cache.insert(stored.id.clone(), stored.clone());
        } else {
            cache.remove(&stored.id);
        }
        Ok(stored)
    }

    /// The active version of `id`, from cache when possible.
    pub async fn get_template(&self, id: &str) -> Result<Option<PromptTemplate>, TemplateError> {
        if let Some(hit) = self.cached(id) {
            debug!(template_id = id, "Template cache hit");
            return Ok(Some(hit));
        }

        let _shared = self.fill_gate.read().await;
        // A write may have landed while we waited for the gate.
        if let Some(hit) = self.cached(id) {
            return Ok(Some(hit));
        }

        debug!(template_id = id, "Template cache miss");
        let loaded = self.store.active(id).await?;
        if let Some(template) = &loaded {
            self.cache().insert(id.to_string(), template.clone());
        }
        Ok(loaded)
    }

    /// Every stored version of `id`, newest first. Bypasses the cache.
    pub async fn versions(&self, id: &str) -> Result<Vec<PromptTemplate>, TemplateError> {
        Ok(self.store.versions(id).await?)
    }

    /// Render the active version of `id` with `variables`.
    pub async fn render(&self, id: &str, variables: &Map<String, Value>) -> Result<String, TemplateError> {
        let template = self
            .get_template(id)
            .await?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
        Ok(render_body(&template.body, variables))
    }

    fn cached(&self, id: &str) -> Option<PromptTemplate> {
        self.cache().get(id).cloned()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, PromptTemplate>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Substitute `{name}` placeholders in `body`.
///
/// Strings are inserted verbatim, `null` as nothing, any other value as its
/// JSON text. Placeholders without a variable are left as written.
pub fn render_body(body: &str, variables: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(body, |caps: &Captures<'_>| match variables.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use replyforge_core::error::StoreError;
    use replyforge_store::InMemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Wraps the in-memory store and counts `active` lookups.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStore,
        active_reads: AtomicUsize,
    }

    impl CountingStore {
        fn reads(&self) -> usize {
            self.active_reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TemplateStore for CountingStore {
        async fn upsert(&self, template: TemplateUpsert) -> Result<PromptTemplate, StoreError> {
            self.inner.upsert(template).await
        }

        async fn active(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError> {
            self.active_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.active(id).await
        }

        async fn versions(&self, id: &str) -> Result<Vec<PromptTemplate>, StoreError> {
            self.inner.versions(id).await
        }
    }

    /// Parks the first armed `active` call after it has read its snapshot.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryStore,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TemplateStore for GatedStore {
        async fn upsert(&self, template: TemplateUpsert) -> Result<PromptTemplate, StoreError> {
            self.inner.upsert(template).await
        }

        async fn active(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError> {
            let snapshot = self.inner.active(id).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            snapshot
        }

        async fn versions(&self, id: &str) -> Result<Vec<PromptTemplate>, StoreError> {
            self.inner.versions(id).await
        }
    }

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn registry(store: Arc<CountingStore>) -> TemplateRegistry {
        TemplateRegistry::new(store, "telegram_default", "Hi {message}").await.unwrap()
    }

    #[tokio::test]
    async fn default_template_is_seeded_once() {
        let store = Arc::new(CountingStore::default());
        registry(store.clone()).await;
        registry(store.clone()).await;

        let versions = store.versions("telegram_default").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].metadata["seeded"], true);
    }

    #[tokio::test]
    async fn upsert_then_get_returns_new_version() {
        let store = Arc::new(CountingStore::default());
        let reg = registry(store.clone()).await;

        let stored = reg
            .upsert_template(TemplateUpsert::new("telegram_default", "v2 {message}"))
            .await
            .unwrap();
        assert_eq!(stored.version, 2);

        let got = reg.get_template("telegram_default").await.unwrap().unwrap();
        assert_eq!(got.version, 2);
        assert_eq!(got.body, "v2 {message}");

        let versions = reg.versions("telegram_default").await.unwrap();
        assert_eq!(versions.iter().filter(|t| t.active).count(), 1);
        assert!(!versions[1].active);
    }

    #[tokio::test]
    async fn cache_hit_skips_storage() {
        let store = Arc::new(CountingStore::default());
        let reg = registry(store.clone()).await;
        reg.upsert_template(TemplateUpsert::new("greet", "hello")).await.unwrap();

        let before = store.reads();
        reg.get_template("greet").await.unwrap();
        reg.get_template("greet").await.unwrap();
        assert_eq!(store.reads(), before);
    }

    #[tokio::test]
    async fn cache_miss_populates_from_storage() {
        let store = Arc::new(CountingStore::default());
        // Written behind the registry's back
        store.upsert(TemplateUpsert::new("greet", "direct")).await.unwrap();
        let reg = registry(store.clone()).await;

        let before = store.reads();
        assert_eq!(reg.get_template("greet").await.unwrap().unwrap().body, "direct");
        assert_eq!(reg.get_template("greet").await.unwrap().unwrap().body, "direct");
        assert_eq!(store.reads(), before + 1);
    }

    #[tokio::test]
    async fn inactive_upsert_drops_cache_entry() {
        let store = Arc::new(CountingStore::default());
        let reg = registry(store.clone()).await;
        reg.upsert_template(TemplateUpsert::new("greet", "v1")).await.unwrap();
        reg.upsert_template(TemplateUpsert::new("greet", "draft").inactive())
            .await
            .unwrap();

        let before = store.reads();
        let got = reg.get_template("greet").await.unwrap().unwrap();
        assert_eq!(got.body, "v1");
        assert_eq!(store.reads(), before + 1);
    }

    #[tokio::test]
    async fn slow_cache_fill_does_not_shadow_concurrent_upsert() {
        let store = Arc::new(GatedStore::default());
        store.upsert(TemplateUpsert::new("greet", "v1")).await.unwrap();
        let reg = Arc::new(TemplateRegistry::without_seed(store.clone()));

        store.armed.store(true, Ordering::SeqCst);
        let reader = tokio::spawn({
            let reg = reg.clone();
            async move { reg.get_template("greet").await }
        });
        store.entered.notified().await;

        let writer = tokio::spawn({
            let reg = reg.clone();
            async move { reg.upsert_template(TemplateUpsert::new("greet", "v2")).await }
        });
        tokio::task::yield_now().await;
        store.release.notify_one();

        reader.await.unwrap().unwrap();
        assert_eq!(writer.await.unwrap().unwrap().version, 2);

        let served = reg.get_template("greet").await.unwrap().unwrap();
        assert_eq!(served.version, 2);
        assert_eq!(served.body, "v2");
    }

    #[tokio::test]
    async fn missing_template_is_none_and_render_fails() {
        let store = Arc::new(CountingStore::default());
        let reg = registry(store).await;
        assert!(reg.get_template("nope").await.unwrap().is_none());

        let err = reg.render("nope", &Map::new()).await.unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn render_uses_active_template() {
        let store = Arc::new(CountingStore::default());
        let reg = registry(store).await;
        let out = reg
            .render("telegram_default", &vars(json!({"message": "how are you?"})))
            .await
            .unwrap();
        assert_eq!(out, "Hi how are you?");
    }

    #[test]
    fn render_body_coerces_values() {
        let out = render_body(
            "{s}|{n}|{b}|{z}|{o}",
            &vars(json!({"s": "text", "n": 3, "b": true, "z": null, "o": {"k": 1}})),
        );
        assert_eq!(out, r#"text|3|true||{"k":1}"#);
    }

    #[test]
    fn render_body_leaves_unknown_placeholders() {
        let out = render_body("Hello {name}, {missing}! {not a placeholder}", &vars(json!({"name": "Ann", "unused": 1})));
        assert_eq!(out, "Hello Ann, {missing}! {not a placeholder}");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let out = render_body("{a}", &vars(json!({"a": "{b}", "b": "nope"})));
        assert_eq!(out, "{b}");
    }
}
