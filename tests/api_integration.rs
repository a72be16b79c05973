//! API Integration Tests for the Teleharvest server
//!
//! Tests the REST API endpoints using axum-test over an in-memory
//! analytics store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use teleharvest::api;
use teleharvest::db::{DetectionFilter, MessageObjectFilter};
use teleharvest::services::AnalyticsStore;
use teleharvest::{AppState, Error, Result};
use teleharvest_models::{
    ChannelActivityItem, DetectionRow, MessageRow, MessageWithObject, TopObjectItem,
};

// ============================================================================
// Test Setup Helpers
// ============================================================================

/// In-memory store that records the arguments it was called with.
#[derive(Default)]
struct MemoryStore {
    messages: Vec<MessageRow>,
    detections: Vec<DetectionRow>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl MemoryStore {
    fn seeded() -> Self {
        let date = |d| Utc.with_ymd_and_hms(2025, 5, d, 9, 30, 0).unwrap();
        Self {
            messages: vec![
                MessageRow {
                    channel: Some("CheMed123".into()),
                    message_id: Some(12),
                    message_text: Some("Paracetamol 500mg back in stock".into()),
                    message_date: Some(date(3)),
                    views: Some(1200),
                    has_media: Some(true),
                },
                MessageRow {
                    channel: Some("lobelia4cosmetics".into()),
                    message_id: Some(7),
                    message_text: Some("New sunscreen arrivals".into()),
                    message_date: Some(date(1)),
                    views: Some(310),
                    has_media: Some(false),
                },
            ],
            detections: vec![
                DetectionRow {
                    channel: Some("CheMed123".into()),
                    message_id: Some(12),
                    image_path: Some("data/raw/images/CheMed123/CheMed123_12_2025-05-03.jpg".into()),
                    object: Some("bottle".into()),
                    confidence: Some(0.91),
                },
                DetectionRow {
                    channel: Some("CheMed123".into()),
                    message_id: Some(12),
                    image_path: Some("data/raw/images/CheMed123/CheMed123_12_2025-05-03.jpg".into()),
                    object: Some("person".into()),
                    confidence: Some(0.42),
                },
            ],
            ..Default::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn search_messages(&self, q: &str, limit: i64) -> Result<Vec<MessageRow>> {
        self.record(format!("search q={q} limit={limit}"))?;
        let needle = q.to_lowercase();
        Ok(self
            .messages
            .iter()
            .filter(|m| {
                m.message_text
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn detections(&self, filter: &DetectionFilter) -> Result<Vec<DetectionRow>> {
        self.record(format!("detections {:?}", filter))?;
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence.unwrap_or(0.0) >= filter.min_confidence)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn channel_activity(&self, channel: &str, days: i32) -> Result<Vec<ChannelActivityItem>> {
        self.record(format!("activity channel={channel} days={days}"))?;
        Ok(vec![
            ChannelActivityItem {
                day: "2025-05-01".into(),
                messages: 4,
            },
            ChannelActivityItem {
                day: "2025-05-03".into(),
                messages: 9,
            },
        ])
    }

    async fn top_objects(&self, limit: i64) -> Result<Vec<TopObjectItem>> {
        self.record(format!("top limit={limit}"))?;
        Ok(vec![TopObjectItem {
            object: "bottle".into(),
            mentions: 37,
        }])
    }

    async fn messages_with_objects(
        &self,
        filter: &MessageObjectFilter,
    ) -> Result<Vec<MessageWithObject>> {
        self.record(format!("joined {:?}", filter))?;
        Ok(vec![MessageWithObject {
            channel: Some("CheMed123".into()),
            message_id: Some(12),
            message_text: Some("Paracetamol 500mg back in stock".into()),
            message_date: None,
            object: Some("bottle".into()),
            confidence: Some(0.91),
        }])
    }

    async fn ping(&self) -> Result<()> {
        self.record("ping".to_string())
    }
}

fn build_test_app(store: Arc<MemoryStore>, origins: &[&str]) -> TestServer {
    let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
    let state = AppState::with_store(store);
    TestServer::new(api::app(state, &origins)).expect("Failed to create test server")
}

fn seeded_app() -> (TestServer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::seeded());
    (build_test_app(store.clone(), &["*"]), store)
}

fn last_call(store: &MemoryStore) -> String {
    store.calls.lock().unwrap().last().cloned().unwrap_or_default()
}

// ============================================================================
// Health Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_returns_healthy() {
    let (server, _store) = seeded_app();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_readiness_ok_when_store_reachable() {
    let (server, _store) = seeded_app();

    let response = server.get("/health/ready").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ready"], true);
    assert_eq!(body["checks"][0]["name"], "database");
}

#[tokio::test]
async fn test_readiness_unavailable_when_store_down() {
    let server = build_test_app(Arc::new(MemoryStore::failing()), &["*"]);

    let response = server.get("/health/ready").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["ready"], false);
    assert_eq!(body["checks"][0]["status"], "unhealthy");
}

// ============================================================================
// Search Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_search_matches_text() {
    let (server, store) = seeded_app();

    let response = server.get("/api/search").add_query_param("q", "paracetamol").await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["channel"], "CheMed123");
    assert_eq!(body[0]["message_id"], 12);
    assert_eq!(body[0]["has_media"], true);
    assert_eq!(last_call(&store), "search q=paracetamol limit=50");
}

#[tokio::test]
async fn test_search_requires_query() {
    let (server, store) = seeded_app();

    let response = server.get("/api/search").await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(store.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_search_rejects_short_query() {
    let (server, _store) = seeded_app();

    let response = server.get("/api/search").add_query_param("q", "a").await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_search_limit_bounds() {
    let (server, _store) = seeded_app();

    for limit in ["0", "1001", "many"] {
        let response = server
            .get("/api/search")
            .add_query_param("q", "stock")
            .add_query_param("limit", limit)
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let response = server
        .get("/api/search")
        .add_query_param("q", "stock")
        .add_query_param("limit", "1000")
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_store_failure_is_server_error() {
    let server = build_test_app(Arc::new(MemoryStore::failing()), &["*"]);

    let response = server.get("/api/search").add_query_param("q", "stock").await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("pool timed out"));
}

// ============================================================================
// Detection Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_detections_defaults() {
    let (server, store) = seeded_app();

    let response = server.get("/api/detections").await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body.len(), 2);
    let call = last_call(&store);
    assert!(call.contains("limit: 100"), "{call}");
    assert!(call.contains("min_confidence: 0.0"), "{call}");
}

#[tokio::test]
async fn test_detections_filters_forwarded() {
    let (server, store) = seeded_app();

    let response = server
        .get("/api/detections")
        .add_query_param("channel", "CheMed123")
        .add_query_param("object_name", "bott")
        .add_query_param("min_confidence", "0.5")
        .await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["object"], "bottle");

    let call = last_call(&store);
    assert!(call.contains("channel: Some(\"CheMed123\")"), "{call}");
    assert!(call.contains("object_name: Some(\"bott\")"), "{call}");
}

#[tokio::test]
async fn test_detections_large_limit_reaches_store() {
    let (server, store) = seeded_app();

    let response = server
        .get("/api/detections")
        .add_query_param("limit", "5000")
        .await;

    response.assert_status_ok();
    let call = last_call(&store);
    assert!(call.contains("limit: 5000"), "{call}");
}

#[tokio::test]
async fn test_detections_rejects_non_positive_limit() {
    let (server, store) = seeded_app();

    for limit in ["0", "-3"] {
        let response = server
            .get("/api/detections")
            .add_query_param("limit", limit)
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }
    assert!(store.calls.lock().unwrap().is_empty());
}

// ============================================================================
// Channel Activity / Top Objects / Joined Messages
// ============================================================================

#[tokio::test]
async fn test_channel_activity() {
    let (server, store) = seeded_app();

    let response = server.get("/api/channel-activity/CheMed123").await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body[0]["day"], "2025-05-01");
    assert_eq!(body[1]["messages"], 9);
    assert_eq!(last_call(&store), "activity channel=CheMed123 days=90");
}

#[tokio::test]
async fn test_channel_activity_days_bounds() {
    let (server, _store) = seeded_app();

    let response = server
        .get("/api/channel-activity/CheMed123")
        .add_query_param("days", "366")
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let response = server
        .get("/api/channel-activity/CheMed123")
        .add_query_param("days", "365")
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_top_objects() {
    let (server, store) = seeded_app();

    let response = server.get("/api/top-objects").await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body[0]["object"], "bottle");
    assert_eq!(body[0]["mentions"], 37);
    assert_eq!(last_call(&store), "top limit=20");

    let response = server
        .get("/api/top-objects")
        .add_query_param("limit", "201")
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_messages_with_objects_paging() {
    let (server, store) = seeded_app();

    let response = server
        .get("/api/messages-with-objects")
        .add_query_param("offset", "50")
        .await;

    response.assert_status_ok();
    let body: Vec<Value> = response.json();
    assert_eq!(body[0]["object"], "bottle");
    assert!(body[0]["message_date"].is_null());
    let call = last_call(&store);
    assert!(call.contains("limit: 50, offset: 50"), "{call}");

    let response = server
        .get("/api/messages-with-objects")
        .add_query_param("offset", "-1")
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================================
// CORS
// ============================================================================

#[tokio::test]
async fn test_cors_wildcard_without_credentials() {
    let (server, _store) = seeded_app();

    let response = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://dash.example.org"))
        .await;

    let headers = response.headers();
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
}

#[tokio::test]
async fn test_cors_explicit_origins_with_credentials() {
    let server = build_test_app(
        Arc::new(MemoryStore::seeded()),
        &["https://dash.example.org", "http://localhost:3000"],
    );

    let response = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"))
        .await;
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );

    let response = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://evil.example.com"))
        .await;
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
