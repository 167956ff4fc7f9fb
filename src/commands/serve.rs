use std::sync::Arc;

use anyhow::{Context, Result};

use slotcast::config::Config;
use slotcast::server::SlotcastServer;

use super::build_orchestrator;

/// Command-line overrides for the `[server]` section
#[derive(Debug, Default)]
pub struct ServeParams {
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub async fn serve(mut config: Config, params: ServeParams) -> Result<()> {
    let ServeParams { host, port } = params;

    if host.is_some() || port.is_some() {
        let current = config.server.bind_address;
        let host = host.unwrap_or_else(|| current.ip().to_string());
        let port = port.unwrap_or(current.port());
        config.server.bind_address = format!("{host}:{port}")
            .parse()
            .context("Invalid bind address")?;
    }

    if let Err(e) = slotcast::metrics::init_metrics() {
        tracing::warn!("Metrics registry unavailable: {}", e);
    }

    let orchestrator = Arc::new(build_orchestrator(&config)?);
    match orchestrator.kill_switch().is_enabled().await {
        Ok(enabled) => slotcast::metrics::set_system_enabled(enabled),
        Err(e) => tracing::warn!("Could not read kill switch: {}", e),
    }

    let server = SlotcastServer::new(config.server.clone(), orchestrator)
        .context("Failed to create server")?;
    let bind_address = config.server.bind_address;

    println!("{}", server.info().display());
    println!();
    println!("API Endpoints:");
    println!("  POST /api/trigger             - Run the current slot");
    println!("  GET  /api/trigger             - Trigger usage and current slot");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/settings/status     - Kill switch state");
    println!("  POST /api/settings/toggle     - Set kill switch");
    println!("  GET  /api/schedule/today      - Today's slot plan");
    println!("  GET  /api/schedule/{{date}}     - Slot plan by date (YYYY-MM-DD)");
    println!("  GET  /api/stock               - Unused content per tenant");
    println!("  GET  /api/runs                - Recent slot runs");
    println!("  GET  /api/outcomes            - Recent posting outcomes");
    println!("  POST /api/admin/sweep         - Close stale runs, prune locks");
    println!("  GET  /metrics                 - Prometheus metrics endpoint");
    println!();
    println!("Listening on http://{bind_address}");
    println!("Press Ctrl+C to stop.\n");

    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    println!("Server stopped.");
    Ok(())
}
