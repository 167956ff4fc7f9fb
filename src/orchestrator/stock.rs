//! Per-tenant inventory report

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scheduler::SlotScheduler;
use crate::storage::{ContentRepository, StoreResult};

/// Days of publishing the target should cover by default
pub const DEFAULT_STOCK_DAYS: u32 = 30;

/// Headroom applied on top of the raw slot count
const STOCK_BUFFER: f64 = 1.25;

#[derive(Debug, Clone, Serialize)]
pub struct TenantStock {
    pub tenant_id: String,
    pub unused: u64,
    pub target: u64,
    pub shortfall: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockReport {
    pub generated_at: DateTime<Utc>,
    pub duration_days: u32,
    pub slots_per_tenant_per_day: u32,
    pub target_per_tenant: u64,
    pub tenants: Vec<TenantStock>,
}

impl StockReport {
    /// Tenants below target
    pub fn short_tenants(&self) -> impl Iterator<Item = &TenantStock> {
        self.tenants.iter().filter(|t| t.shortfall > 0)
    }

    pub fn display(&self) -> String {
        let mut out = format!(
            "Content stock ({} days, target {} unused per tenant)\n{:-<48}\n",
            self.duration_days, self.target_per_tenant, ""
        );
        for t in &self.tenants {
            let marker = if t.shortfall > 0 { "  LOW" } else { "" };
            out.push_str(&format!(
                "{:<12} {:>6} / {:<6}{}\n",
                t.tenant_id, t.unused, t.target, marker
            ));
        }
        out
    }
}

/// Unused items a tenant needs to cover `duration_days` of its slots
pub fn stock_target(slots_per_tenant_per_day: u32, duration_days: u32) -> u64 {
    let raw = f64::from(slots_per_tenant_per_day) * f64::from(duration_days) * STOCK_BUFFER;
    raw.ceil() as u64
}

pub async fn stock_report(
    scheduler: &SlotScheduler,
    content: &dyn ContentRepository,
    duration_days: u32,
    now: DateTime<Utc>,
) -> StoreResult<StockReport> {
    let per_day = scheduler.slots_per_tenant_per_day();
    let target = stock_target(per_day, duration_days);

    let mut tenants = Vec::with_capacity(scheduler.roster().len());
    for tenant_id in scheduler.roster() {
        let unused = content.count_unused_content(tenant_id).await?;
        tenants.push(TenantStock {
            tenant_id: tenant_id.clone(),
            unused,
            target,
            shortfall: target.saturating_sub(unused),
        });
    }

    Ok(StockReport {
        generated_at: now,
        duration_days,
        slots_per_tenant_per_day: per_day,
        target_per_tenant: target,
        tenants,
    })
}
