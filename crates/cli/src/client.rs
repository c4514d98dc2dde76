//! HTTP client for the sentineld control API

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the sentineld control surface
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET that tolerates error statuses. The probe endpoints encode health
    /// in the status code but always carry a JSON body worth showing.
    pub async fn get_lenient<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API request and response types. These mirror the daemon's wire format so
// the CLI stays decoupled from the engine crate.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: String,
    pub category: String,
    pub source: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub created_at: String,
    pub status: String,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub escalation_level: u32,
    pub notifications_sent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub at: String,
    pub event: String,
    pub alert: Alert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetricRequest {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetricResponse {
    pub metric: String,
    pub ready: bool,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub tracked_metrics: usize,
    pub alerts: AlertStatistics,
    pub analysis: AnalysisStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub active_total: usize,
    pub active_unacknowledged: usize,
    pub active_by_severity: HashMap<String, usize>,
    pub active_by_category: HashMap<String, usize>,
    pub created_total: u64,
    pub deduplicated_total: u64,
    pub resolved_total: u64,
    pub auto_resolved_total: u64,
    pub resolved_last_24h: usize,
    pub escalations_total: u64,
    pub notifications_sent_total: u64,
    pub notifications_failed_total: u64,
    pub history_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStatistics {
    pub cycles_completed: u64,
    pub baselines_tracked: usize,
    pub correlated_pairs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn sample_alert_json(id: &str, severity: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "severity": severity,
            "category": "trading",
            "source": "statistical-detector",
            "title": "trade_pnl anomaly",
            "description": "z-score 3.2 against the rolling baseline",
            "context": {"kind": "metric_anomaly", "metric": "trade_pnl"},
            "policy": {"priority": 2},
            "created_at": "2026-08-20T10:15:00Z",
            "status": "active",
            "acknowledged": false,
            "escalation_level": 0,
            "notifications_sent": 3
        })
    }

    #[tokio::test]
    async fn parses_the_active_alert_listing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/alerts/active?severity=critical")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!([sample_alert_json("alert-1", "CRITICAL")]).to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let alerts: Vec<Alert> =
            assert_ok!(client.get("api/v1/alerts/active?severity=critical").await);

        mock.assert_async().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "alert-1");
        assert_eq!(alerts[0].severity, "CRITICAL");
        assert!(!alerts[0].acknowledged);
        assert_eq!(alerts[0].context["metric"], "trade_pnl");
    }

    #[tokio::test]
    async fn posts_the_acknowledgment_body() {
        let mut server = mockito::Server::new_async().await;
        let mut acknowledged = sample_alert_json("alert-2", "HIGH");
        acknowledged["acknowledged"] = serde_json::json!(true);
        acknowledged["acknowledged_by"] = serde_json::json!("ops");

        let mock = server
            .mock("POST", "/api/v1/alerts/alert-2/acknowledge")
            .match_body(mockito::Matcher::Json(serde_json::json!({"by": "ops"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(acknowledged.to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let alert: Alert = assert_ok!(
            client
                .post(
                    "api/v1/alerts/alert-2/acknowledge",
                    &AcknowledgeRequest {
                        by: "ops".to_string()
                    },
                )
                .await
        );

        mock.assert_async().await;
        assert!(alert.acknowledged);
        assert_eq!(alert.acknowledged_by.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn error_statuses_surface_the_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/alerts/active")
            .with_status(400)
            .with_body(r#"{"error":"unknown severity: urgent"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result: Result<Vec<Alert>> = client.get("api/v1/alerts/active").await;

        let error = result.unwrap_err().to_string();
        assert!(error.contains("400"), "missing status in: {error}");
        assert!(error.contains("unknown severity"), "missing body in: {error}");
    }

    #[tokio::test]
    async fn lenient_get_parses_bodies_on_error_statuses() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "status": "unhealthy",
                    "components": {
                        "ingest": {
                            "status": "unhealthy",
                            "message": "task exited",
                            "last_check": "2026-08-20T10:15:00Z"
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health: HealthResponse = assert_ok!(client.get_lenient("healthz").await);

        assert_eq!(health.status, "unhealthy");
        assert_eq!(
            health.components["ingest"].message.as_deref(),
            Some("task exited")
        );
    }

    #[tokio::test]
    async fn parses_statistics_with_breakdowns() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/statistics")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "tracked_metrics": 4,
                    "alerts": {
                        "active_total": 2,
                        "active_unacknowledged": 1,
                        "active_by_severity": {"CRITICAL": 1, "LOW": 1},
                        "active_by_category": {"trading": 2},
                        "created_total": 9,
                        "deduplicated_total": 3,
                        "resolved_total": 7,
                        "auto_resolved_total": 2,
                        "resolved_last_24h": 5,
                        "escalations_total": 4,
                        "notifications_sent_total": 31,
                        "notifications_failed_total": 1,
                        "history_records": 16
                    },
                    "analysis": {
                        "cycles_completed": 120,
                        "baselines_tracked": 4,
                        "correlated_pairs": 6,
                        "last_cycle_at": "2026-08-20T10:15:00Z"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let stats: EngineStatistics = assert_ok!(client.get("api/v1/statistics").await);

        assert_eq!(stats.tracked_metrics, 4);
        assert_eq!(stats.alerts.active_by_severity["CRITICAL"], 1);
        assert_eq!(stats.alerts.notifications_failed_total, 1);
        assert_eq!(stats.analysis.cycles_completed, 120);
    }
}
