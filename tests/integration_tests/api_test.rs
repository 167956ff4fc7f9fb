//! HTTP surface over a seeded orchestrator

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use slotcast::server::{create_router, AppState, ServerConfig};

use crate::common::Harness;

const SECRET: &str = "cron-secret";

async fn app() -> (Harness, Router) {
    let h = Harness::seeded(2).await;
    let config = ServerConfig {
        api_secret: Some(SECRET.to_string()),
        ..ServerConfig::default()
    };
    let router = create_router(AppState::new(h.orchestrator.clone(), config));
    (h, router)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Body::empty())
        .unwrap()
}

fn toggle(enabled: bool, auth: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/settings/toggle")
        .header(header::CONTENT_TYPE, "application/json");
    if auth {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {SECRET}"));
    }
    builder
        .body(Body::from(serde_json::json!({ "enabled": enabled }).to_string()))
        .unwrap()
}

async fn json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_trigger_publishes_then_reports_already_executed() {
    let (h, app) = app().await;

    let response = app.clone().oneshot(authed_post("/api/trigger")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["executed"], true);
    assert_eq!(body["success"], true);
    assert_eq!(body["slot_key"], "20240115-05-00");
    assert_eq!(body["tenant_id"], "FP_1");
    assert_eq!(body["post_id"], "page-FP_1_post_0");
    assert_eq!(body["stage"], "RECORDED");

    let response = app.oneshot(authed_post("/api/trigger")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["executed"], false);
    assert_eq!(body["reason"], "already_executed");

    assert_eq!(h.publisher.calls(), 1);
}

#[tokio::test]
async fn test_trigger_info_shows_current_slot() {
    let (h, app) = app().await;

    let response = app.oneshot(get("/api/trigger")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["auth_required"], true);
    assert_eq!(body["current_slot"]["slot_key"], "20240115-05-00");
    assert_eq!(body["current_slot"]["tenant_id"], "FP_1");
    assert_eq!(h.publisher.calls(), 0);
}

#[tokio::test]
async fn test_toggle_requires_secret_and_stops_triggers() {
    let (h, app) = app().await;

    let response = app.clone().oneshot(toggle(false, false)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.clone().oneshot(toggle(false, true)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["data"]["enabled"], false);

    let response = app.clone().oneshot(get("/api/settings/status")).await.unwrap();
    assert_eq!(json(response).await["data"]["enabled"], false);

    let response = app.clone().oneshot(authed_post("/api/trigger")).await.unwrap();
    assert_eq!(json(response).await["reason"], "disabled");

    let response = app.clone().oneshot(toggle(true, true)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(authed_post("/api/trigger")).await.unwrap();
    assert_eq!(json(response).await["success"], true);
    assert_eq!(h.publisher.calls(), 1);
}

#[tokio::test]
async fn test_history_endpoints() {
    let (_h, app) = app().await;
    app.clone().oneshot(authed_post("/api/trigger")).await.unwrap();

    let response = app.clone().oneshot(get("/api/runs?limit=5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    let runs = body["data"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["slot_key"], "20240115-05-00");
    assert_eq!(runs[0]["status"], "completed");

    let response = app.oneshot(get("/api/outcomes")).await.unwrap();
    let body = json(response).await;
    let outcomes = body["data"].as_array().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0]["success"], true);
    assert_eq!(outcomes[0]["content_id"], "FP_1-c0");
}

#[tokio::test]
async fn test_stock_and_today_plan() {
    let (_h, app) = app().await;

    let response = app.clone().oneshot(get("/api/stock?days=30")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["data"]["duration_days"], 30);
    assert_eq!(body["data"]["slots_per_tenant_per_day"], 17);
    let tenants = body["data"]["tenants"].as_array().unwrap();
    assert_eq!(tenants.len(), 10);
    assert_eq!(tenants[0]["unused"], 2);

    let response = app.oneshot(get("/api/schedule/today")).await.unwrap();
    let body = json(response).await;
    assert_eq!(body["data"]["date"], "2024-01-15");
    assert_eq!(body["data"]["slots"][0]["tenant_id"], "FP_1");
}

#[tokio::test]
async fn test_sweep_requires_secret() {
    let (_h, app) = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/sweep")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(authed_post("/api/admin/sweep")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["locks_pruned"], 0);
}

#[tokio::test]
async fn test_health_and_metrics() {
    slotcast::metrics::init_metrics().unwrap();
    let (_h, app) = app().await;

    let response = app.clone().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["data"]["status"], "healthy");

    app.clone().oneshot(authed_post("/api/trigger")).await.unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("slotcast_trigger_invocations_total"));
    assert!(text.contains("slotcast_api_requests_total"));
}
