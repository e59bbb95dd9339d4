//! `replyforge doctor` — Diagnose configuration, providers and storage.

use replyforge_config::AppConfig;
use replyforge_providers::build_from_config;
use replyforge_security::InjectionScreen;
use replyforge_store::SqliteStore;
use std::path::Path;

pub async fn run(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 ReplyForge Doctor — System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    // Check config
    let config_path = super::config_path(explicit);
    if !config_path.exists() {
        println!("  ⚠️  No config file at {} — using defaults (run `replyforge onboard`)", config_path.display());
        issues += 1;
    }
    let config = match super::load_config(explicit) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Ok(());
        }
    };

    // Check patterns
    match InjectionScreen::from_config(&config.screen) {
        Ok(screen) => println!(
            "  ✅ Injection patterns compile ({} block, {} sanitize)",
            screen.block_pattern_count(),
            screen.sanitize_pattern_count()
        ),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Check providers
    issues += check_providers(&config).await;

    // Check storage
    match SqliteStore::new(&config.database_url).await {
        Ok(store) => match store.ping().await {
            Ok(()) => println!("  ✅ Store reachable: {}", config.database_url),
            Err(e) => {
                println!("  ❌ Store query failed: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Store unavailable: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

async fn check_providers(config: &AppConfig) -> usize {
    if config.providers.is_empty() {
        println!("  ❌ No providers configured — every turn will use the fallback reply");
        return 1;
    }

    let mut issues = 0;
    for provider in &config.providers {
        if config.api_key_for(provider).is_empty() {
            println!("  ⚠️  Provider '{}' has no API key", provider.name);
            issues += 1;
        }
    }

    let router = build_from_config(config);
    println!("  ✅ {} provider(s) in failover order: {}", router.len(), router.provider_names().join(" → "));
    for (name, healthy) in router.health().await {
        if healthy {
            println!("     ✅ {name} reachable");
        } else {
            println!("     ⚠️  {name} health check failed");
            issues += 1;
        }
    }
    issues
}
