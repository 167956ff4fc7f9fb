pub mod admin;
pub mod run;
pub mod serve;

use anyhow::{Context, Result};

use slotcast::config::Config;
use slotcast::orchestrator::{Dependencies, Orchestrator};

// Re-export command functions for convenience
pub use admin::{content_add, content_list, plan, set_enabled, status, stock, tenant_list, tenant_set};
pub use run::{sweep, trigger};
pub use serve::{serve, ServeParams};

/// Production wiring shared by every command
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let deps = Dependencies::from_config(config).context("Failed to initialise dependencies")?;
    Orchestrator::new(config, deps).context("Failed to create orchestrator")
}
