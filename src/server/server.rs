//! HTTP server wiring

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::orchestrator::Orchestrator;

use super::api::create_router;
use super::config::ServerConfig;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,

    /// Server start time
    pub start_time: Instant,

    pub config: ServerConfig,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ServerConfig) -> Self {
        Self {
            orchestrator,
            start_time: Instant::now(),
            config,
        }
    }
}

// ============================================================================
// Slotcast Server
// ============================================================================

pub struct SlotcastServer {
    config: ServerConfig,
    state: AppState,
}

impl SlotcastServer {
    pub fn new(config: ServerConfig, orchestrator: Arc<Orchestrator>) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        if config.effective_secret().is_none() {
            tracing::warn!("No API secret configured; trigger and admin endpoints are unauthenticated");
        }

        let state = AppState::new(orchestrator, config.clone());
        Ok(Self { config, state })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Router with CORS and request tracing applied per config
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        tracing::info!("Starting slotcast server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    pub fn info(&self) -> ServerInfo {
        let scheduler = self.state.orchestrator.scheduler();
        let schedule = scheduler.config();
        ServerInfo {
            bind_address: self.config.bind_address,
            window: format!(
                "{:02}:00-{:02}:00 (UTC{:+}m)",
                schedule.window_start_hour, schedule.window_end_hour, schedule.utc_offset_minutes
            ),
            slot_length_minutes: schedule.slot_length_minutes,
            tenants: scheduler.roster().len(),
            auth_enabled: self.config.effective_secret().is_some(),
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

/// Startup summary
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub window: String,
    pub slot_length_minutes: u32,
    pub tenants: usize,
    pub auth_enabled: bool,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    pub fn display(&self) -> String {
        let onoff = |flag: bool| if flag { "enabled" } else { "disabled" };
        format!(
            "Slotcast Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Window: {}\n\
             Slot Length: {}m\n\
             Tenants: {}\n\
             Auth: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.window,
            self.slot_length_minutes,
            self.tenants,
            onoff(self.auth_enabled),
            onoff(self.cors_enabled),
            onoff(self.request_logging_enabled)
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Debug, Clone)]
pub enum ServerError {
    ConfigError(String),

    /// Failed to bind to address
    BindError(String),

    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}
