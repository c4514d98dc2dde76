//! Observability infrastructure for the detection engine
//!
//! Provides:
//! - Prometheus metrics (ingestion volume, detections, alert lifecycle,
//!   notification outcomes, analysis cycle timing)
//! - Structured JSON logging of alert lifecycle events via tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::alerts::{Alert, ChannelKind};

/// Histogram buckets for analysis cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EngineMetricsInner {
    samples_ingested: IntCounter,
    samples_rejected: IntCounter,
    anomalies_detected: IntCounterVec,
    alerts_created: IntCounterVec,
    alerts_deduplicated: IntCounter,
    alerts_resolved: IntCounter,
    alert_escalations: IntCounter,
    active_alerts: IntGauge,
    notifications: IntCounterVec,
    analysis_cycles: IntCounter,
    analysis_cycle_seconds: Histogram,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "sentinel_samples_ingested_total",
                "Total metric samples accepted into series"
            )
            .expect("Failed to register samples_ingested"),

            samples_rejected: register_int_counter!(
                "sentinel_samples_rejected_total",
                "Total metric samples rejected at validation"
            )
            .expect("Failed to register samples_rejected"),

            anomalies_detected: register_int_counter_vec!(
                "sentinel_anomalies_detected_total",
                "Total anomalies found, by detector",
                &["detector"]
            )
            .expect("Failed to register anomalies_detected"),

            alerts_created: register_int_counter_vec!(
                "sentinel_alerts_created_total",
                "Total alerts created, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_created"),

            alerts_deduplicated: register_int_counter!(
                "sentinel_alerts_deduplicated_total",
                "Total alerts suppressed as duplicates of a recent alert"
            )
            .expect("Failed to register alerts_deduplicated"),

            alerts_resolved: register_int_counter!(
                "sentinel_alerts_resolved_total",
                "Total alerts resolved, by operator or automatically"
            )
            .expect("Failed to register alerts_resolved"),

            alert_escalations: register_int_counter!(
                "sentinel_alert_escalations_total",
                "Total escalation steps taken on unacknowledged alerts"
            )
            .expect("Failed to register alert_escalations"),

            active_alerts: register_int_gauge!(
                "sentinel_active_alerts",
                "Alerts currently active (unresolved)"
            )
            .expect("Failed to register active_alerts"),

            notifications: register_int_counter_vec!(
                "sentinel_notifications_total",
                "Notification delivery attempts, by channel and outcome",
                &["channel", "outcome"]
            )
            .expect("Failed to register notifications"),

            analysis_cycles: register_int_counter!(
                "sentinel_analysis_cycles_total",
                "Completed periodic analysis cycles"
            )
            .expect("Failed to register analysis_cycles"),

            analysis_cycle_seconds: register_histogram!(
                "sentinel_analysis_cycle_seconds",
                "Wall time of one full analysis cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_cycle_seconds"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_samples_ingested(&self) {
        self.inner().samples_ingested.inc();
    }

    pub fn inc_samples_rejected(&self) {
        self.inner().samples_rejected.inc();
    }

    pub fn inc_anomalies_detected(&self, detector: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[detector])
            .inc();
    }

    pub fn inc_alerts_created(&self, severity: &str) {
        self.inner()
            .alerts_created
            .with_label_values(&[severity])
            .inc();
    }

    pub fn inc_alerts_deduplicated(&self) {
        self.inner().alerts_deduplicated.inc();
    }

    pub fn inc_alerts_resolved(&self) {
        self.inner().alerts_resolved.inc();
    }

    pub fn inc_alert_escalations(&self) {
        self.inner().alert_escalations.inc();
    }

    pub fn set_active_alerts(&self, count: i64) {
        self.inner().active_alerts.set(count);
    }

    pub fn inc_notification(&self, channel: ChannelKind, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner()
            .notifications
            .with_label_values(&[channel.as_str(), outcome])
            .inc();
    }

    pub fn inc_analysis_cycles(&self) {
        self.inner().analysis_cycles.inc();
    }

    pub fn observe_analysis_cycle(&self, duration_secs: f64) {
        self.inner().analysis_cycle_seconds.observe(duration_secs);
    }
}

/// Structured logger for alert lifecycle events
///
/// Keeps the event vocabulary in one place so log consumers can key on
/// `event` instead of parsing message text.
#[derive(Clone, Default)]
pub struct EventLogger;

impl EventLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn alert_created(&self, alert: &Alert) {
        info!(
            event = "alert_created",
            alert_id = %alert.id,
            severity = %alert.severity,
            category = %alert.category,
            source = %alert.source,
            title = %alert.title,
            "Alert created"
        );
    }

    pub fn alert_deduplicated(&self, category: &str, title: &str, existing_id: &str) {
        info!(
            event = "alert_deduplicated",
            category = %category,
            title = %title,
            existing_id = %existing_id,
            "Suppressed duplicate alert"
        );
    }

    pub fn alert_acknowledged(&self, alert: &Alert, by: &str) {
        info!(
            event = "alert_acknowledged",
            alert_id = %alert.id,
            severity = %alert.severity,
            acknowledged_by = %by,
            "Alert acknowledged"
        );
    }

    pub fn alert_escalated(&self, alert: &Alert, level: u32, contacts: &[String]) {
        warn!(
            event = "alert_escalated",
            alert_id = %alert.id,
            severity = %alert.severity,
            escalation_level = level,
            contacts = ?contacts,
            "Alert escalated"
        );
    }

    pub fn alert_resolved(&self, alert: &Alert, by: &str, automatic: bool) {
        info!(
            event = "alert_resolved",
            alert_id = %alert.id,
            severity = %alert.severity,
            resolved_by = %by,
            automatic = automatic,
            "Alert resolved"
        );
    }

    pub fn notification_failed(&self, alert_id: &str, channel: ChannelKind, error: &str) {
        warn!(
            event = "notification_failed",
            alert_id = %alert_id,
            channel = %channel,
            error = %error,
            "Notification delivery failed"
        );
    }
}
