//! Integration tests for the daemon API, driven through the router without
//! opening a socket (plus one end-to-end pass over a real listener).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use sentinel_lib::alerts::{categories, AlertDraft, AlertSeverity};
use sentinel_lib::config::{EngineConfig, MetricConfig};
use sentinel_lib::health::components;
use sentinel_lib::Engine;
use sentineld::api::{create_router, serve_on, AppState};

fn test_engine() -> Arc<Engine> {
    let config = EngineConfig::default().with_metric(
        "api_latency_ms",
        MetricConfig::new(categories::SYSTEM, AlertSeverity::High),
    );
    Arc::new(Engine::new(config).unwrap())
}

fn router_for(engine: Arc<Engine>) -> Router {
    create_router(Arc::new(AppState { engine }))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn raise(engine: &Arc<Engine>, severity: AlertSeverity, category: &str, title: &str) -> String {
    engine
        .raise_alert(AlertDraft::new(severity, category, title, "test alert"))
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn ingest_accepts_tracked_samples() {
    let router = router_for(test_engine());

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/metrics",
            json!({ "name": "api_latency_ms", "value": 120.5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["metric"], "api_latency_ms");
    assert_eq!(body["samples"], 1);
    assert_eq!(body["ready"], false);

    // Backfill with an explicit timestamp lands the same way.
    let stamped = router
        .oneshot(post_json(
            "/api/v1/metrics",
            json!({
                "name": "api_latency_ms",
                "value": 98.0,
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "metadata": { "region": "eu-west-1" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(stamped.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(stamped).await["samples"], 2);
}

#[tokio::test]
async fn ingest_rejects_unknown_metrics() {
    let router = router_for(test_engine());
    let response = router
        .oneshot(post_json(
            "/api/v1/metrics",
            json!({ "name": "throughput", "value": 1.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("throughput"));
}

#[tokio::test]
async fn lifecycle_status_codes_follow_the_state_machine() {
    let engine = test_engine();
    let router = router_for(engine.clone());
    let id = raise(&engine, AlertSeverity::High, "trading", "pnl drop").await;

    let ack = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/alerts/{id}/acknowledge"),
            json!({ "by": "ops" }),
        ))
        .await
        .unwrap();
    assert_eq!(ack.status(), StatusCode::OK);
    let body = body_json(ack).await;
    assert_eq!(body["acknowledged"], true);
    assert_eq!(body["acknowledged_by"], "ops");

    let again = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/alerts/{id}/acknowledge"),
            json!({ "by": "ops" }),
        ))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let resolve = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/alerts/{id}/resolve"),
            json!({ "by": "ops", "resolution": "position closed" }),
        ))
        .await
        .unwrap();
    assert_eq!(resolve.status(), StatusCode::OK);
    let body = body_json(resolve).await;
    assert_eq!(body["status"], "resolved");
    assert_eq!(body["resolution"], "position closed");

    let re_resolve = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/alerts/{id}/resolve"),
            json!({ "by": "ops" }),
        ))
        .await
        .unwrap();
    assert_eq!(re_resolve.status(), StatusCode::CONFLICT);

    let missing = router
        .oneshot(post_json(
            "/api/v1/alerts/no-such-id/acknowledge",
            json!({ "by": "ops" }),
        ))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn active_listing_filters_by_severity_and_acknowledgment() {
    let engine = test_engine();
    let router = router_for(engine.clone());
    let critical = raise(&engine, AlertSeverity::Critical, "trading", "loss streak").await;
    raise(&engine, AlertSeverity::Low, "system", "minor wobble").await;
    engine.acknowledge_alert(&critical, "ops").await.unwrap();

    let all = router.clone().oneshot(get("/api/v1/alerts/active")).await.unwrap();
    assert_eq!(all.status(), StatusCode::OK);
    let body = body_json(all).await;
    let alerts = body.as_array().unwrap();
    assert_eq!(alerts.len(), 2);
    // Most urgent severity first.
    assert_eq!(alerts[0]["severity"], "CRITICAL");

    let criticals = router
        .clone()
        .oneshot(get("/api/v1/alerts/active?severity=critical"))
        .await
        .unwrap();
    assert_eq!(body_json(criticals).await.as_array().unwrap().len(), 1);

    let unacked = router
        .clone()
        .oneshot(get("/api/v1/alerts/active?acknowledged=false"))
        .await
        .unwrap();
    let body = body_json(unacked).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["severity"], "LOW");

    let invalid = router
        .oneshot(get("/api/v1/alerts/active?severity=urgent"))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_is_newest_first_with_limit() {
    let engine = test_engine();
    let router = router_for(engine.clone());
    let id = raise(&engine, AlertSeverity::High, "system", "disk filling").await;
    engine.acknowledge_alert(&id, "ops").await.unwrap();

    let limited = router
        .clone()
        .oneshot(get("/api/v1/alerts/history?limit=1"))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::OK);
    let body = body_json(limited).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["event"], "acknowledged");
    assert_eq!(body[0]["alert"]["id"], id.as_str());

    let all = router.oneshot(get("/api/v1/alerts/history")).await.unwrap();
    assert_eq!(body_json(all).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn statistics_report_engine_counters() {
    let engine = test_engine();
    let router = router_for(engine.clone());
    raise(&engine, AlertSeverity::High, "trading", "pnl drop").await;

    let response = router.oneshot(get("/api/v1/statistics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tracked_metrics"], 1);
    assert_eq!(body["alerts"]["created_total"], 1);
    assert_eq!(body["alerts"]["active_total"], 1);
    assert_eq!(body["alerts"]["active_unacknowledged"], 1);
    assert_eq!(body["alerts"]["active_by_severity"]["HIGH"], 1);
    assert_eq!(body["alerts"]["active_by_category"]["trading"], 1);
    assert_eq!(body["analysis"]["cycles_completed"], 0);
}

#[tokio::test]
async fn probes_follow_the_health_registry() {
    let engine = test_engine();
    let router = router_for(engine.clone());

    // Nothing registered yet: healthy but not ready.
    let health = router.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["status"], "healthy");

    let ready = router.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(ready).await["ready"], false);

    engine.health().set_ready(true).await;
    let ready = router.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    engine
        .health()
        .set_degraded(components::HISTORY, "disk full")
        .await;
    let degraded = router.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(degraded.status(), StatusCode::OK);
    assert_eq!(body_json(degraded).await["status"], "degraded");

    engine
        .health()
        .set_unhealthy(components::INGEST, "store offline")
        .await;
    let unhealthy = router.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(unhealthy.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(unhealthy).await["status"], "unhealthy");
}

#[tokio::test]
async fn metrics_exposition_includes_engine_counters() {
    let engine = test_engine();
    let router = router_for(engine.clone());
    engine.record_value("api_latency_ms", 50.0).await.unwrap();

    let response = router.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sentinel_samples_ingested_total"));
    assert!(text.contains("sentinel_active_alerts"));
    assert!(text.contains("sentinel_analysis_cycle_seconds_count"));
}

#[tokio::test]
async fn serve_round_trips_over_a_real_socket() {
    let engine = test_engine();
    let state = Arc::new(AppState { engine });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, _) = tokio::sync::broadcast::channel(1);
    let server = tokio::spawn(serve_on(listener, state, shutdown.subscribe()));

    let client = reqwest::Client::new();
    let accepted = client
        .post(format!("http://{addr}/api/v1/metrics"))
        .json(&json!({ "name": "api_latency_ms", "value": 42.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status().as_u16(), 202);

    let health = client
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status().as_u16(), 200);

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}
