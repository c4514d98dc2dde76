//! Alert domain types and the alert lifecycle
//!
//! This module owns:
//! - The [`Alert`] entity and its severity/status/context/attempt types
//! - The lifecycle manager (create, dedup, acknowledge, resolve, escalate)
//! - Channel fan-out with per-channel failure isolation
//! - The append-only history log and its persistence seam

mod dispatch;
mod history;
mod manager;

pub use dispatch::{
    AlertNotice, ChannelRegistry, LogChannel, NoticeEvent, NotificationChannel,
    NotificationDispatcher,
};
pub use history::{
    AlertHistory, HistoryEvent, HistoryFilter, HistoryRecord, HistoryStore, JsonFileHistoryStore,
};
pub use manager::{
    ActiveAlertRepo, ActiveFilter, AlertManager, AlertStatistics, InMemoryAlertRepo,
    AUTO_RESOLUTION_NOTE, SYSTEM_RESOLVER,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AlertPolicy;
use crate::models::Trend;

/// Well-known alert categories. The field itself is free-form; producers may
/// use anything, these are the ones the engine emits.
pub mod categories {
    pub const TRADING: &str = "trading";
    pub const SYSTEM: &str = "system";
    pub const SECURITY: &str = "security";
    pub const PATTERN_DETECTION: &str = "pattern_detection";
    pub const PREDICTIVE: &str = "predictive";
    pub const CORRELATION: &str = "correlation";
}

/// Alert severity; selects the notification/escalation policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl AlertSeverity {
    pub fn all() -> [AlertSeverity; 4] {
        [
            AlertSeverity::Critical,
            AlertSeverity::High,
            AlertSeverity::Medium,
            AlertSeverity::Low,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::Low => "LOW",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(AlertSeverity::Critical),
            "HIGH" => Ok(AlertSeverity::High),
            "MEDIUM" => Ok(AlertSeverity::Medium),
            "LOW" => Ok(AlertSeverity::Low),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Where an alert sits in its lifecycle. `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => f.write_str("active"),
            AlertStatus::Resolved => f.write_str("resolved"),
        }
    }
}

/// Delivery channel identity. Concrete transports live outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    Webhook,
    Dashboard,
}

impl ChannelKind {
    pub fn all() -> [ChannelKind; 4] {
        [
            ChannelKind::Email,
            ChannelKind::Sms,
            ChannelKind::Webhook,
            ChannelKind::Dashboard,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Dashboard => "dashboard",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured detail for the known alert shapes, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextDetail {
    /// Statistical z-score hit on one metric.
    MetricAnomaly {
        metric: String,
        observed: f64,
        threshold: f64,
        score: f64,
        mean: f64,
        std_dev: f64,
        trend: Trend,
    },
    /// Named behavioral pattern hit.
    Pattern {
        metric: String,
        pattern: String,
        observed: f64,
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        data: serde_json::Map<String, serde_json::Value>,
    },
    /// Forecast expected to breach the baseline.
    Predictive {
        metric: String,
        predicted: f64,
        horizon_secs: u64,
        confidence: f64,
        baseline_mean: f64,
        baseline_std_dev: f64,
        trend: Trend,
    },
    /// Divergence between a pair's historical and recent correlation.
    Correlation {
        metric_a: String,
        metric_b: String,
        expected: f64,
        recent: f64,
        delta: f64,
        matched_points: usize,
    },
    /// Alert raised directly by a producer or operator, no detection detail.
    General,
}

/// Alert context: one structured detail shape plus an open bag for anything
/// that does not fit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    #[serde(flatten)]
    pub detail: ContextDetail,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

impl AlertContext {
    pub fn new(detail: ContextDetail) -> Self {
        Self {
            detail,
            additional: serde_json::Map::new(),
        }
    }

    pub fn general() -> Self {
        Self::new(ContextDetail::General)
    }

    pub fn with_additional(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.additional.insert(key.into(), value);
        self
    }
}

impl Default for AlertContext {
    fn default() -> Self {
        Self::general()
    }
}

/// Record of one delivery attempt on one channel. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub channel: ChannelKind,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationAttempt {
    pub fn success(channel: ChannelKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            channel,
            timestamp,
            success: true,
            error: None,
        }
    }

    pub fn failure(
        channel: ChannelKind,
        timestamp: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            timestamp,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The central lifecycle entity.
///
/// Owned by the manager's active table until resolved, then moved into the
/// append-only history log. The policy block is a snapshot taken at creation
/// and never re-read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub category: String,
    pub source: String,
    pub title: String,
    pub description: String,
    pub context: AlertContext,
    pub policy: AlertPolicy,
    pub created_at: DateTime<Utc>,
    pub status: AlertStatus,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub escalation_level: u32,
    pub notifications_sent: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<NotificationAttempt>,
}

impl Alert {
    /// Materialize a draft into a live alert with a fresh id and a policy
    /// snapshot.
    pub fn from_draft(draft: AlertDraft, policy: AlertPolicy, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            severity: draft.severity,
            category: draft.category,
            source: draft.source,
            title: draft.title,
            description: draft.description,
            context: draft.context,
            policy,
            created_at,
            status: AlertStatus::Active,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
            escalation_level: 0,
            notifications_sent: 0,
            attempts: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == AlertStatus::Resolved
    }
}

/// A candidate alert as built by detectors or producers, before identity and
/// policy are assigned.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub severity: AlertSeverity,
    pub category: String,
    pub source: String,
    pub title: String,
    pub description: String,
    pub context: AlertContext,
}

impl AlertDraft {
    pub fn new(
        severity: AlertSeverity,
        category: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            source: "engine".to_string(),
            title: title.into(),
            description: description.into(),
            context: AlertContext::general(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_context(mut self, context: AlertContext) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_wire_form_is_uppercase() {
        let json = serde_json::to_string(&AlertSeverity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let parsed: AlertSeverity = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, AlertSeverity::High);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("critical".parse::<AlertSeverity>(), Ok(AlertSeverity::Critical));
        assert_eq!("Low".parse::<AlertSeverity>(), Ok(AlertSeverity::Low));
        assert!("urgent".parse::<AlertSeverity>().is_err());
    }

    #[test]
    fn channel_wire_form_is_lowercase() {
        let json = serde_json::to_string(&ChannelKind::Dashboard).unwrap();
        assert_eq!(json, "\"dashboard\"");
    }

    #[test]
    fn context_detail_round_trips_through_kind_tag() {
        let context = AlertContext::new(ContextDetail::MetricAnomaly {
            metric: "latency".to_string(),
            observed: 1000.0,
            threshold: 2.0,
            score: 990.0,
            mean: 10.0,
            std_dev: 0.0,
            trend: Trend::Stable,
        })
        .with_additional("region", serde_json::json!("eu-west-1"));

        let json = serde_json::to_string(&context).unwrap();
        assert!(json.contains("\"kind\":\"metric_anomaly\""));

        let parsed: AlertContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, context);
        // Same bytes when re-serialized: nothing derived drifts.
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn general_context_round_trips() {
        let context = AlertContext::general();
        let json = serde_json::to_string(&context).unwrap();
        let parsed: AlertContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, context);
    }
}
