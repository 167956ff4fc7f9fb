//! Process-wide enable flag persisted in settings

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::storage::{SettingsRepository, StoreResult};

/// Settings key holding the flag
pub const SYSTEM_ENABLED_KEY: &str = "system_enabled";

/// Reads and writes the persisted kill switch. An absent setting means enabled.
#[derive(Clone)]
pub struct KillSwitch {
    settings: Arc<dyn SettingsRepository>,
}

impl KillSwitch {
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    pub async fn is_enabled(&self) -> StoreResult<bool> {
        let value = self.settings.get_setting(SYSTEM_ENABLED_KEY).await?;
        Ok(value.as_deref().map(parse_flag).unwrap_or(true))
    }

    pub async fn set_enabled(&self, enabled: bool, at: DateTime<Utc>) -> StoreResult<()> {
        self.settings
            .put_setting(SYSTEM_ENABLED_KEY, if enabled { "true" } else { "false" }, at)
            .await?;
        crate::metrics::set_system_enabled(enabled);
        tracing::info!(enabled, "Kill switch updated");
        Ok(())
    }
}

/// Only explicit "off" values disable; unrecognised values keep the system on
fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "off" | "no" | "disabled"
    )
}
