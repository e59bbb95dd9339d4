//! `replyforge outcomes` — Show recent generation outcomes.

use replyforge_core::outcome::OutcomeStore;
use std::path::Path;

pub async fn run(explicit: Option<&Path>, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;
    let store = super::open_store(&config).await?;
    let outcomes = store.recent(limit).await?;

    if outcomes.is_empty() {
        println!("No outcomes recorded yet.");
        return Ok(());
    }

    for o in &outcomes {
        let status = if o.is_success() { "✅" } else { "⚠️ " };
        println!(
            "{status} {} {} conv={} provider={} model={} decision={} {}ms",
            o.created_at.format("%Y-%m-%d %H:%M:%S"),
            o.request_id,
            o.conversation_id,
            o.provider,
            o.model,
            o.decision,
            o.latency_ms,
        );
        if !o.error.is_empty() {
            println!("     error: {}", o.error);
        }
    }
    Ok(())
}
