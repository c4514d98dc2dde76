//! HTTP control surface
//!
//! One router carries everything the daemon exposes: sample ingest, the
//! alert lifecycle, history and statistics queries, the health probes, and
//! Prometheus exposition. Handlers stay thin; status codes derive from the
//! engine's error taxonomy.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use prometheus::Encoder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use sentinel_lib::alerts::{ActiveFilter, Alert, HistoryFilter, HistoryRecord};
use sentinel_lib::health::ComponentStatus;
use sentinel_lib::models::{MetricSample, SampleMetadata};
use sentinel_lib::{AlertSeverity, Engine, EngineError, EngineStatistics};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// [`EngineError`] rendered as an HTTP status with a JSON body.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation(_)
            | EngineError::UnknownMetric(_)
            | EngineError::Configuration(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyAcknowledged(_) | EngineError::AlreadyResolved(_) => {
                StatusCode::CONFLICT
            }
            EngineError::Io(_) | EngineError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RecordMetricRequest {
    name: String,
    value: f64,
    /// Producers backfilling samples may stamp them explicitly.
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: SampleMetadata,
}

#[derive(Debug, Serialize)]
struct RecordMetricResponse {
    metric: String,
    ready: bool,
    samples: usize,
}

async fn record_metric(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecordMetricRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sample = match request.timestamp {
        Some(at) => MetricSample::at(request.name.clone(), request.value, at, request.metadata),
        None => MetricSample::new(request.name.clone(), request.value, request.metadata),
    };
    let outcome = state.engine.record_metric(sample).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RecordMetricResponse {
            metric: request.name,
            ready: outcome.ready,
            samples: outcome.stats.count,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct ActiveQuery {
    category: Option<String>,
    severity: Option<String>,
    acknowledged: Option<bool>,
}

async fn active_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let filter = ActiveFilter {
        category: query.category,
        severity: parse_severity(query.severity.as_deref())?,
        acknowledged: query.acknowledged,
    };
    Ok(Json(state.engine.active_alerts(filter).await))
}

#[derive(Debug, Deserialize)]
struct AcknowledgeRequest {
    by: String,
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.engine.acknowledge_alert(&id, &request.by).await?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    by: String,
    #[serde(default)]
    resolution: Option<String>,
}

async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .engine
        .resolve_alert(&id, &request.by, request.resolution)
        .await?;
    Ok(Json(alert))
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    category: Option<String>,
    severity: Option<String>,
    limit: Option<usize>,
}

async fn alert_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let filter = HistoryFilter {
        category: query.category,
        severity: parse_severity(query.severity.as_deref())?,
        limit: query.limit,
    };
    Ok(Json(state.engine.alert_history(&filter).await))
}

async fn statistics(State(state): State<Arc<AppState>>) -> Json<EngineStatistics> {
    Json(state.engine.statistics().await)
}

fn parse_severity(raw: Option<&str>) -> Result<Option<AlertSeverity>, ApiError> {
    raw.map(|value| value.parse::<AlertSeverity>())
        .transpose()
        .map_err(|message| ApiError(EngineError::Validation(message)))
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.engine.health().health().await;
    let status = match health.status {
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.engine.health().readiness().await;
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

async fn metrics_exposition() -> Response {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => ([("content-type", "text/plain; charset=utf-8")], buffer).into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {error}"),
        )
            .into_response(),
    }
}

/// All daemon routes over the shared engine state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/metrics", post(record_metric))
        .route("/api/v1/alerts/active", get(active_alerts))
        .route("/api/v1/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/v1/alerts/:id/resolve", post(resolve_alert))
        .route("/api/v1/alerts/history", get(alert_history))
        .route("/api/v1/statistics", get(statistics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_exposition))
        .with_state(state)
}

/// Bind on `0.0.0.0:{port}` and serve until the shutdown channel fires.
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("binding api listener on port {port}"))?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already-bound listener. Split out so tests can bind an
/// ephemeral port first.
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("reading listener address")?;
    info!(%addr, "api listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("api server terminated")?;
    Ok(())
}
