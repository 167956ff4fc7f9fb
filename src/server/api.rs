//! REST API handlers
//!
//! The trigger endpoint answers `200` with a [`TriggerResult`] body for every
//! outcome, including skips and failures. Only a bad or missing bearer
//! secret gets a different status (`401`).

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{PostingOutcome, SlotExecutionRecord};
use crate::orchestrator::stock::DEFAULT_STOCK_DAYS;
use crate::orchestrator::TriggerResult;
use crate::scheduler::{DayPlan, Slot};
use crate::storage::{OutcomeRepository, SlotRecordRepository};

use super::server::AppState;

/// Default and maximum page size for history endpoints
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn internal_error(context: &str, err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, "{context}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err}"))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct TriggerInfo {
    pub message: String,
    pub method: String,
    pub auth_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_slot: Option<Slot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn effective(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub days: Option<u32>,
}

// ============================================================================
// API Routes
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Trigger
        .route("/api/trigger", post(trigger).get(trigger_info))
        // Kill switch
        .route("/api/settings/status", get(system_status))
        .route("/api/settings/toggle", post(toggle_system))
        // Schedule and inventory
        .route("/api/schedule/today", get(today_plan))
        .route("/api/schedule/{date}", get(plan_by_date))
        .route("/api/stock", get(stock))
        // History
        .route("/api/runs", get(recent_runs))
        .route("/api/outcomes", get(recent_outcomes))
        // Maintenance
        .route("/api/admin/sweep", post(sweep))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;
    crate::metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// `Err` carries a ready 401 response
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(secret) = state.config.effective_secret() else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == secret => Ok(()),
        _ => {
            tracing::warn!("Rejected request with missing or invalid bearer secret");
            Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// ============================================================================
// Health Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

async fn metrics() -> Response {
    match crate::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => internal_error("Failed to encode metrics", e),
    }
}

// ============================================================================
// Trigger Handlers
// ============================================================================

async fn trigger(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let result: TriggerResult = state.orchestrator.trigger().await;
    (StatusCode::OK, Json(result)).into_response()
}

async fn trigger_info(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let current_slot = orchestrator.scheduler().slot_at(orchestrator.clock().now());

    Json(TriggerInfo {
        message: "POST to this endpoint to run the current slot".to_string(),
        method: "POST".to_string(),
        auth_required: state.config.effective_secret().is_some(),
        current_slot,
    })
}

// ============================================================================
// Kill Switch Handlers
// ============================================================================

async fn system_status(State(state): State<AppState>) -> Response {
    match state.orchestrator.kill_switch().is_enabled().await {
        Ok(enabled) => Json(ApiResponse::success(SystemStatus { enabled })).into_response(),
        Err(e) => internal_error("Failed to read system status", e),
    }
}

async fn toggle_system(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SystemStatus>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let now = state.orchestrator.clock().now();
    match state
        .orchestrator
        .kill_switch()
        .set_enabled(request.enabled, now)
        .await
    {
        Ok(()) => Json(ApiResponse::success(SystemStatus {
            enabled: request.enabled,
        }))
        .into_response(),
        Err(e) => internal_error("Failed to update system status", e),
    }
}

// ============================================================================
// Schedule Handlers
// ============================================================================

async fn today_plan(State(state): State<AppState>) -> impl IntoResponse {
    let scheduler = state.orchestrator.scheduler();
    let today = scheduler.local_date(state.orchestrator.clock().now());
    Json(ApiResponse::<DayPlan>::success(scheduler.day_plan(today)))
}

async fn plan_by_date(State(state): State<AppState>, Path(date_str): Path<String>) -> Response {
    let date = match NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid date format: {}. Expected YYYY-MM-DD", date_str),
            );
        }
    };

    let plan = state.orchestrator.scheduler().day_plan(date);
    Json(ApiResponse::success(plan)).into_response()
}

async fn stock(State(state): State<AppState>, Query(query): Query<StockQuery>) -> Response {
    let days = query.days.unwrap_or(DEFAULT_STOCK_DAYS).max(1);
    match state.orchestrator.stock_report(days).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => internal_error("Failed to compute stock", e),
    }
}

// ============================================================================
// History Handlers
// ============================================================================

async fn recent_runs(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    match state
        .orchestrator
        .storage()
        .slots
        .recent_slot_records(query.effective())
        .await
    {
        Ok(records) => Json(ApiResponse::<Vec<SlotExecutionRecord>>::success(records)).into_response(),
        Err(e) => internal_error("Failed to list runs", e),
    }
}

async fn recent_outcomes(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match state
        .orchestrator
        .storage()
        .outcomes
        .recent_outcomes(query.effective())
        .await
    {
        Ok(outcomes) => Json(ApiResponse::<Vec<PostingOutcome>>::success(outcomes)).into_response(),
        Err(e) => internal_error("Failed to list outcomes", e),
    }
}

async fn sweep(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    match state.orchestrator.sweep().await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => internal_error("Sweep failed", e),
    }
}

// ============================================================================
// Tests
// ============================================================================
