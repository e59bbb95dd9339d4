//! Subcommand implementations and the wiring they share.

pub mod doctor;
pub mod generate;
pub mod onboard;
pub mod outcomes;
pub mod template;
pub mod turn;

use replyforge_config::{AppConfig, ConfigError};
use replyforge_pipeline::GenerationOrchestrator;
use replyforge_store::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The config file in use: `--config` if given, else the default path.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path)
}

/// Load (and validate) configuration with environment overrides applied.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::load_with_overrides(&config_path(explicit))
}

/// Open the configured SQLite store.
pub async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::new(&config.database_url).await?))
}

/// Build the full pipeline over the configured store.
pub async fn orchestrator(
    explicit: Option<&Path>,
) -> Result<(GenerationOrchestrator, Arc<SqliteStore>), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    tracing::debug!(?config, "Configuration loaded");
    let store = open_store(&config).await?;
    let orchestrator = GenerationOrchestrator::from_config(&config, store.clone()).await?;
    Ok((orchestrator, store))
}
