use anyhow::{Context, Result};
use chrono::NaiveDate;

use slotcast::config::Config;
use slotcast::models::{ContentItem, Tenant};
use slotcast::storage::{ContentRepository, SlotRecordRepository, TenantRepository};
use slotcast::utils::{redact_secret, truncate_text};

use super::build_orchestrator;

pub async fn status(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let now = orchestrator.clock().now();
    let scheduler = orchestrator.scheduler();
    let enabled = orchestrator.kill_switch().is_enabled().await?;

    println!("Slotcast Status");
    println!("===============");
    println!("  System: {}", if enabled { "ENABLED" } else { "DISABLED" });
    println!(
        "  Local time: {}",
        now.with_timezone(&scheduler.offset()).format("%Y-%m-%d %H:%M")
    );

    match scheduler.slot_at(now) {
        Some(slot) => println!(
            "  Current slot: {} -> {} (until {})",
            slot.slot_key,
            slot.tenant_id,
            slot.ends_at.format("%H:%M")
        ),
        None => println!("  Current slot: none (outside window)"),
    }

    let runs = orchestrator.storage().slots.recent_slot_records(5).await?;
    if runs.is_empty() {
        println!("\nNo runs recorded yet.");
        return Ok(());
    }

    println!("\nRecent runs:");
    for run in runs {
        println!(
            "  {:<16} {:<8} {:<10} {}",
            run.slot_key,
            run.tenant_id,
            run.status.as_str(),
            truncate_text(run.result_summary.as_deref().unwrap_or("-"), 60)
        );
    }
    Ok(())
}

pub async fn set_enabled(config: Config, enabled: bool) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let now = orchestrator.clock().now();
    orchestrator
        .kill_switch()
        .set_enabled(enabled, now)
        .await
        .context("Failed to update kill switch")?;

    println!("System {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub async fn tenant_set(
    config: Config,
    id: String,
    page_id: String,
    credential: Option<String>,
) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;

    if !orchestrator.scheduler().roster().contains(&id) {
        tracing::warn!(tenant_id = %id, "Tenant is not in the configured roster");
    }

    let mut tenant = Tenant::new(id, page_id);
    tenant.created_at = orchestrator.clock().now();
    if let Some(credential) = credential {
        tenant = tenant.with_credential(credential);
    }

    orchestrator
        .storage()
        .tenants
        .upsert_tenant(&tenant)
        .await
        .context("Failed to save tenant")?;

    println!(
        "Saved tenant {} (page {}, credential {})",
        tenant.id,
        tenant.external_page_id,
        tenant
            .usable_credential()
            .map(redact_secret)
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}

pub async fn tenant_list(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let tenants = orchestrator.storage().tenants.list_tenants().await?;

    println!("{:<10} {:<20} {}", "Tenant", "Page", "Credential");
    for roster_id in orchestrator.scheduler().roster() {
        match tenants.iter().find(|t| &t.id == roster_id) {
            Some(t) => println!(
                "{:<10} {:<20} {}",
                t.id,
                t.external_page_id,
                t.usable_credential()
                    .map(redact_secret)
                    .unwrap_or_else(|| "MISSING".to_string())
            ),
            None => println!("{:<10} {:<20} {}", roster_id, "-", "MISSING"),
        }
    }
    Ok(())
}

pub async fn content_add(
    config: Config,
    tenant_id: String,
    payload_ref: String,
    caption: String,
) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let item = ContentItem::new(tenant_id, payload_ref, caption)
        .with_created_at(orchestrator.clock().now());

    orchestrator
        .storage()
        .content
        .insert_content(&item)
        .await
        .context("Failed to add content")?;

    println!("Added content {} for {}", item.id, item.tenant_id);
    Ok(())
}

pub async fn content_list(config: Config, tenant_id: String, limit: usize) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let items = orchestrator
        .storage()
        .content
        .list_content_for_tenant(&tenant_id, limit)
        .await?;

    if items.is_empty() {
        println!("No content for {tenant_id}");
        return Ok(());
    }

    println!("Rotation order for {tenant_id}:");
    for (i, item) in items.iter().enumerate() {
        println!(
            "{:>3}. {} used={} created={} {}",
            i + 1,
            item.id,
            item.used_count,
            item.created_at.format("%Y-%m-%d %H:%M"),
            truncate_text(&item.caption, 40)
        );
    }
    Ok(())
}

pub async fn plan(config: Config, date: Option<String>) -> Result<()> {
    let scheduler = config.scheduler()?;

    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date {raw}, expected YYYY-MM-DD"))?,
        None => scheduler.local_date(chrono::Utc::now()),
    };

    print!("{}", scheduler.day_plan(date).display());
    Ok(())
}

pub async fn stock(config: Config, days: u32) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let report = orchestrator.stock_report(days.max(1)).await?;

    print!("{}", report.display());
    let short = report.short_tenants().count();
    if short > 0 {
        println!("\n{short} tenant(s) below target");
    }
    Ok(())
}
