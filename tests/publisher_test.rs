//! Publishing client and payload fetcher against a mock HTTP server

use std::time::Duration;

use bytes::Bytes;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use slotcast::config::PublisherConfig;
use slotcast::models::ErrorKind;
use slotcast::publisher::{
    GraphApiClient, HttpPayloadFetcher, PayloadFetcher, PostingClient, PublishError,
    PublishRequest,
};
use slotcast::utils::retry::RetryConfig;

const BUDGET: Duration = Duration::from_secs(5);

fn config(server: &MockServer) -> PublisherConfig {
    PublisherConfig {
        graph_url: format!("{}/v19.0", server.uri()),
        request_timeout_secs: 5,
        ..PublisherConfig::default()
    }
}

fn request() -> PublishRequest {
    PublishRequest {
        page_id: "1001".to_string(),
        credential: "page-token".to_string(),
        payload: Bytes::from_static(b"jpeg-bytes"),
        caption: "Morning post".to_string(),
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig::with_delays(2, 10, 50)
}

// ============================================================================
// Graph API Client
// ============================================================================

#[tokio::test]
async fn test_publish_returns_post_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .and(body_string_contains("Morning post"))
        .and(body_string_contains("page-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "id": "555", "post_id": "1001_555" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = GraphApiClient::new(&config(&server)).unwrap();
    let receipt = assert_ok!(client.publish(request(), BUDGET).await);
    assert_eq!(receipt.external_post_id, "1001_555");
}

#[tokio::test]
async fn test_publish_error_object_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "message": "Error validating access token",
                "type": "OAuthException",
                "code": 190
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GraphApiClient::new(&config(&server))
        .unwrap()
        .with_retry(fast_retry());
    let err = assert_err!(client.publish(request(), BUDGET).await);

    assert_eq!(
        err,
        PublishError::Api {
            code: 190,
            status: 400,
            message: "Error validating access token".to_string(),
        }
    );
    assert_eq!(err.error_kind(), ErrorKind::Publish);
}

#[tokio::test]
async fn test_publish_server_error_is_not_resent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(1)
        .mount(&server)
        .await;

    let client = GraphApiClient::new(&config(&server))
        .unwrap()
        .with_retry(fast_retry());
    let err = assert_err!(client.publish(request(), BUDGET).await);
    assert_eq!(err.error_kind(), ErrorKind::Publish);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn test_publish_slow_response_is_not_resent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "post_id": "1001_1" }))
                .set_delay(Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = PublisherConfig {
        request_timeout_secs: 1,
        ..config(&server)
    };
    let client = GraphApiClient::new(&config)
        .unwrap()
        .with_retry(fast_retry());
    let err = assert_err!(client.publish(request(), BUDGET).await);
    assert!(matches!(err, PublishError::Timeout { .. }), "{err:?}");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn test_publish_throttled_is_resent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "message": "Page request limit reached", "code": 32 }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "777" })))
        .mount(&server)
        .await;

    let client = GraphApiClient::new(&config(&server))
        .unwrap()
        .with_retry(fast_retry());
    let receipt = assert_ok!(client.publish(request(), BUDGET).await);
    assert_eq!(receipt.external_post_id, "777");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn test_publish_connection_refused_is_resent() {
    // Grab a free port and release it so nothing is listening there
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = PublisherConfig {
        graph_url: format!("http://127.0.0.1:{port}/v19.0"),
        request_timeout_secs: 5,
        ..PublisherConfig::default()
    };

    let client = GraphApiClient::new(&config)
        .unwrap()
        .with_retry(fast_retry());
    let err = assert_err!(client.publish(request(), BUDGET).await);
    assert!(matches!(err, PublishError::Connect(_)), "{err:?}");
    assert!(err.is_safe_to_resend());
}

#[tokio::test]
async fn test_publish_respects_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/1001/photos"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "id": "1" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = GraphApiClient::new(&config(&server))
        .unwrap()
        .with_retry(RetryConfig::none());
    let err = client
        .publish(request(), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Timeout { .. }), "{err:?}");
    assert_eq!(err.error_kind(), ErrorKind::Publish);
}

// ============================================================================
// Payload Fetcher
// ============================================================================

#[tokio::test]
async fn test_fetch_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
        .mount(&server)
        .await;

    let fetcher = HttpPayloadFetcher::new(&config(&server)).unwrap();
    let bytes = fetcher
        .fetch(&format!("{}/media/a.jpg", server.uri()), BUDGET)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), b"jpeg-bytes");
}

#[tokio::test]
async fn test_fetch_not_found_is_download_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/missing.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpPayloadFetcher::new(&config(&server))
        .unwrap()
        .with_retry(fast_retry());
    let payload_ref = format!("{}/media/missing.jpg", server.uri());
    let err = fetcher.fetch(&payload_ref, BUDGET).await.unwrap_err();

    assert_eq!(err, PublishError::download(payload_ref, "HTTP 404", Some(404)));
    assert_eq!(err.error_kind(), ErrorKind::Download);
}

#[tokio::test]
async fn test_fetch_empty_body_is_download_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/empty.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let fetcher = HttpPayloadFetcher::new(&config(&server)).unwrap();
    let err = fetcher
        .fetch(&format!("{}/media/empty.jpg", server.uri()), BUDGET)
        .await
        .unwrap_err();
    assert_eq!(err.error_kind(), ErrorKind::Download);
    assert!(err.to_string().contains("empty body"));
}

#[tokio::test]
async fn test_bare_file_id_uses_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"drive-bytes".to_vec()))
        .mount(&server)
        .await;

    let config = PublisherConfig {
        payload_base_url: format!("{}/uc?export=download&id=", server.uri()),
        ..config(&server)
    };
    let fetcher = HttpPayloadFetcher::new(&config).unwrap();
    let bytes = fetcher.fetch("1AbC_d-9", BUDGET).await.unwrap();
    assert_eq!(bytes.as_ref(), b"drive-bytes");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received[0].url.query(), Some("export=download&id=1AbC_d-9"));
}
