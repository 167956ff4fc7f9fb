use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use slotcast::config::Config;

use super::build_orchestrator;

/// Run one invocation now, or as if triggered at `at` (RFC 3339)
pub async fn trigger(config: Config, at: Option<String>) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;

    let result = match at {
        Some(raw) => {
            let at = DateTime::parse_from_rfc3339(&raw)
                .with_context(|| format!("Invalid --at timestamp: {raw}"))?
                .with_timezone(&Utc);
            orchestrator.trigger_at(at).await
        }
        None => orchestrator.trigger().await,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn sweep(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let report = orchestrator.sweep().await.context("Sweep failed")?;

    println!("Sweep at {}", report.swept_at.to_rfc3339());
    println!("  Stale runs failed: {}", report.stale_slot_keys.len());
    for key in &report.stale_slot_keys {
        println!("    - {key}");
    }
    println!("  Expired locks pruned: {}", report.locks_pruned);
    Ok(())
}
