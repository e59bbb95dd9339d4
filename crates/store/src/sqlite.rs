//! SQLite backend for templates and generation outcomes.
//!
//! Uses a single SQLite database with two tables:
//! - `prompt_templates` — one row per (template id, version); a partial
//!   unique index allows at most one active row per id
//! - `generation_outcomes` — append-only audit rows

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use replyforge_core::error::StoreError;
use replyforge_core::outcome::{GenerationOutcome, OutcomeStore};
use replyforge_core::template::{PromptTemplate, TemplateStore, TemplateUpsert};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed template and outcome store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url`.
    ///
    /// Accepts `sqlite://path/to/file.db` or `sqlite::memory:` for an
    /// ephemeral in-process database. Missing parent directories are created.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        if !in_memory {
            ensure_parent_dir(url)?;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database lives only as long as its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Wrap an existing pool, running migrations first.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations. Idempotent.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompt_templates (
                template_id  TEXT NOT NULL,
                version      INTEGER NOT NULL,
                body         TEXT NOT NULL,
                metadata     TEXT NOT NULL DEFAULT '{}',
                active       INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL,
                PRIMARY KEY (template_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("prompt_templates table: {e}")))?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_prompt_templates_one_active
            ON prompt_templates(template_id) WHERE active = 1
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("active index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generation_outcomes (
                iid              INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id       TEXT NOT NULL,
                conversation_id  TEXT NOT NULL,
                provider         TEXT NOT NULL,
                model            TEXT NOT NULL,
                latency_ms       INTEGER NOT NULL,
                fallback_used    INTEGER NOT NULL,
                decision         TEXT NOT NULL,
                error            TEXT NOT NULL DEFAULT '',
                final_text       TEXT NOT NULL,
                metadata         TEXT NOT NULL DEFAULT '{}',
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("generation_outcomes table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_outcomes_conversation ON generation_outcomes(conversation_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversation index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Cheap round-trip used by health checks.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("ping: {e}")))?;
        Ok(())
    }

    fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<PromptTemplate, StoreError> {
        let id: String = column(row, "template_id")?;
        let version: i64 = column(row, "version")?;
        let body: String = column(row, "body")?;
        let metadata: String = column(row, "metadata")?;
        let active: bool = column(row, "active")?;
        let created_at: String = column(row, "created_at")?;

        Ok(PromptTemplate {
            id,
            version: u32::try_from(version)
                .map_err(|_| StoreError::QueryFailed(format!("version out of range: {version}")))?,
            body,
            metadata: parse_metadata(&metadata),
            active,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn row_to_outcome(row: &sqlx::sqlite::SqliteRow) -> Result<GenerationOutcome, StoreError> {
        let decision: String = column(row, "decision")?;
        let latency_ms: i64 = column(row, "latency_ms")?;
        let metadata: String = column(row, "metadata")?;
        let created_at: String = column(row, "created_at")?;

        Ok(GenerationOutcome {
            request_id: column(row, "request_id")?,
            conversation_id: column(row, "conversation_id")?,
            final_text: column(row, "final_text")?,
            provider: column(row, "provider")?,
            model: column(row, "model")?,
            fallback_used: column(row, "fallback_used")?,
            decision: decision.parse().map_err(StoreError::QueryFailed)?,
            error: column(row, "error")?,
            latency_ms: latency_ms.max(0) as u64,
            created_at: parse_timestamp(&created_at),
            metadata: parse_metadata(&metadata),
        })
    }
}

#[async_trait]
impl TemplateStore for SqliteStore {
    async fn upsert(&self, template: TemplateUpsert) -> Result<PromptTemplate, StoreError> {
        let metadata = serde_json::to_string(&template.metadata)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?;
        let created_at = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        if template.active {
            sqlx::query(
                "UPDATE prompt_templates SET active = 0 WHERE template_id = ?1 AND active = 1",
            )
            .bind(&template.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Deactivate failed: {e}")))?;
        }

        // Version assignment happens inside the INSERT so it shares the
        // transaction's write lock.
        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO prompt_templates (template_id, version, body, metadata, active, created_at)
            VALUES (
                ?1,
                COALESCE(?2, (SELECT COALESCE(MAX(version), 0) + 1
                              FROM prompt_templates WHERE template_id = ?1)),
                ?3, ?4, ?5, ?6
            )
            RETURNING version
            "#,
        )
        .bind(&template.id)
        .bind(template.version.map(i64::from))
        .bind(&template.body)
        .bind(&metadata)
        .bind(template.active)
        .bind(created_at.to_rfc3339())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(format!(
                "template '{}' version {} already exists",
                template.id,
                template
                    .version
                    .map_or_else(|| "(next)".to_string(), |v| v.to_string())
            )),
            _ => StoreError::Storage(format!("INSERT failed: {e}")),
        })?;

        // Checked before COMMIT so an out-of-range version rolls back with `tx`.
        let version = u32::try_from(version).map_err(|_| {
            StoreError::Conflict(format!(
                "template '{}' has no version left after {}",
                template.id,
                u32::MAX
            ))
        })?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;
        debug!(template_id = %template.id, version, active = template.active, "Stored template");

        Ok(PromptTemplate {
            id: template.id,
            version,
            body: template.body,
            metadata: template.metadata,
            active: template.active,
            created_at,
        })
    }

    async fn active(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM prompt_templates
            WHERE template_id = ?1 AND active = 1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Active template lookup: {e}")))?;

        row.as_ref().map(Self::row_to_template).transpose()
    }

    async fn versions(&self, id: &str) -> Result<Vec<PromptTemplate>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM prompt_templates WHERE template_id = ?1 ORDER BY version DESC")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("Template versions: {e}")))?;

        rows.iter().map(Self::row_to_template).collect()
    }
}

#[async_trait]
impl OutcomeStore for SqliteStore {
    async fn append(&self, outcome: &GenerationOutcome) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&outcome.metadata)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO generation_outcomes (
                request_id, conversation_id, provider, model, latency_ms,
                fallback_used, decision, error, final_text, metadata, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&outcome.request_id)
        .bind(&outcome.conversation_id)
        .bind(&outcome.provider)
        .bind(&outcome.model)
        .bind(i64::try_from(outcome.latency_ms).unwrap_or(i64::MAX))
        .bind(outcome.fallback_used)
        .bind(outcome.decision.as_str())
        .bind(&outcome.error)
        .bind(&outcome.final_text)
        .bind(&metadata)
        .bind(outcome.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        debug!(request_id = %outcome.request_id, "Stored outcome");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<GenerationOutcome>, StoreError> {
        let rows = sqlx::query("SELECT * FROM generation_outcomes ORDER BY iid DESC LIMIT ?1")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Recent outcomes: {e}")))?;

        rows.iter().map(Self::row_to_outcome).collect()
    }
}

fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn parse_metadata(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Create the directory holding a file-backed database.
fn ensure_parent_dir(url: &str) -> Result<(), StoreError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use replyforge_core::verdict::Decision;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn outcome(request_id: &str) -> GenerationOutcome {
        GenerationOutcome {
            request_id: request_id.into(),
            conversation_id: "chat-1".into(),
            final_text: "Hello!".into(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            fallback_used: false,
            decision: Decision::Sanitize,
            error: String::new(),
            latency_ms: 42,
            created_at: Utc::now(),
            metadata: serde_json::json!({"template_id": "telegram_default"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn upsert_assigns_increasing_versions() {
        let db = test_store().await;
        let v1 = db.upsert(TemplateUpsert::new("greet", "Hi {name}")).await.unwrap();
        let v2 = db.upsert(TemplateUpsert::new("greet", "Hello {name}")).await.unwrap();
        let other = db.upsert(TemplateUpsert::new("bye", "Bye")).await.unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(other.version, 1);
    }

    #[tokio::test]
    async fn active_upsert_deactivates_previous_version() {
        let db = test_store().await;
        db.upsert(TemplateUpsert::new("greet", "v1")).await.unwrap();
        db.upsert(TemplateUpsert::new("greet", "v2")).await.unwrap();

        let active = db.active("greet").await.unwrap().unwrap();
        assert_eq!(active.version, 2);
        assert_eq!(active.body, "v2");

        let versions = db.versions("greet").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 2);
        assert_eq!(versions.iter().filter(|t| t.active).count(), 1);
    }

    #[tokio::test]
    async fn inactive_upsert_keeps_current_active() {
        let db = test_store().await;
        db.upsert(TemplateUpsert::new("greet", "v1")).await.unwrap();
        let draft = db
            .upsert(TemplateUpsert::new("greet", "draft").inactive())
            .await
            .unwrap();

        assert_eq!(draft.version, 2);
        assert!(!draft.active);
        assert_eq!(db.active("greet").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn duplicate_version_is_a_conflict_and_rolls_back() {
        let db = test_store().await;
        db.upsert(TemplateUpsert::new("greet", "v1")).await.unwrap();

        let err = db
            .upsert(TemplateUpsert::new("greet", "again").with_version(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The failed upsert must not have deactivated v1
        let active = db.active("greet").await.unwrap().unwrap();
        assert_eq!(active.body, "v1");
    }

    #[tokio::test]
    async fn exhausted_version_space_conflicts_and_rolls_back() {
        let db = test_store().await;
        db.upsert(TemplateUpsert::new("greet", "last").with_version(u32::MAX))
            .await
            .unwrap();

        let err = db.upsert(TemplateUpsert::new("greet", "next")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let active = db.active("greet").await.unwrap().unwrap();
        assert_eq!((active.version, active.body.as_str()), (u32::MAX, "last"));
        assert_eq!(db.versions("greet").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn explicit_version_is_respected() {
        let db = test_store().await;
        let t = db
            .upsert(TemplateUpsert::new("greet", "v10").with_version(10))
            .await
            .unwrap();
        assert_eq!(t.version, 10);

        let next = db.upsert(TemplateUpsert::new("greet", "v11")).await.unwrap();
        assert_eq!(next.version, 11);
    }

    #[tokio::test]
    async fn metadata_round_trips() {
        let db = test_store().await;
        let meta = serde_json::json!({"owner": "ops", "tags": ["a"]})
            .as_object()
            .cloned()
            .unwrap();
        db.upsert(TemplateUpsert::new("greet", "x").with_metadata(meta.clone()))
            .await
            .unwrap();
        assert_eq!(db.active("greet").await.unwrap().unwrap().metadata, meta);
    }

    #[tokio::test]
    async fn missing_template_is_none() {
        let db = test_store().await;
        assert!(db.active("nope").await.unwrap().is_none());
        assert!(db.versions("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outcomes_are_listed_newest_first() {
        let db = test_store().await;
        db.append(&outcome("req-1")).await.unwrap();
        db.append(&outcome("req-2")).await.unwrap();
        db.append(&outcome("req-3")).await.unwrap();

        let recent = db.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].request_id, "req-3");
        assert_eq!(recent[1].request_id, "req-2");

        let first = &recent[0];
        assert_eq!(first.decision, Decision::Sanitize);
        assert_eq!(first.latency_ms, 42);
        assert_eq!(first.metadata["template_id"], "telegram_default");
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("replyforge.db");
        let url = format!("sqlite://{}", path.display());

        {
            let db = SqliteStore::new(&url).await.unwrap();
            db.upsert(TemplateUpsert::new("greet", "persisted")).await.unwrap();
            db.append(&outcome("req-1")).await.unwrap();
        }

        let db = SqliteStore::new(&url).await.unwrap();
        assert_eq!(db.active("greet").await.unwrap().unwrap().body, "persisted");
        assert_eq!(db.recent(10).await.unwrap().len(), 1);
        db.ping().await.unwrap();
    }
}
