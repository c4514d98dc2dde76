//! Daemon configuration
//!
//! Settings come from an optional TOML file layered under `SENTINEL_*`
//! environment variables. `SENTINEL_CONFIG` points at the file; without it
//! the loader looks for `sentinel.toml` next to the process. The tracked
//! metric table only fits in the file; a daemon started without one tracks
//! a starter set that exercises all four pattern detectors.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use sentinel_lib::alerts::categories;
use sentinel_lib::config::{EngineConfig, MetricConfig, Sensitivity};
use sentinel_lib::detect::PatternKind;
use sentinel_lib::AlertSeverity;

fn default_port() -> u16 {
    8080
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/alert-history.json")
}

fn default_persist_history() -> bool {
    true
}

/// Everything the daemon binary reads at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Port the HTTP API binds on `0.0.0.0`.
    #[serde(default = "default_port")]
    pub port: u16,
    /// File the alert history is persisted to between runs.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// Disable to run without any history file.
    #[serde(default = "default_persist_history")]
    pub persist_history: bool,
    /// Cadence of the predictive/correlation cycle, in seconds.
    #[serde(default)]
    pub analysis_interval_secs: Option<u64>,
    /// Cadence of the trim/persist cleanup pass, in seconds.
    #[serde(default)]
    pub cleanup_interval_secs: Option<u64>,
    /// Window in which a same-category, same-title alert is a duplicate.
    #[serde(default)]
    pub dedup_window_secs: Option<u64>,
    /// Tracked metrics. Empty falls back to [`starter_metrics`].
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
}

/// One tracked metric as written in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricEntry {
    pub name: String,
    pub category: String,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub patterns: Vec<PatternKind>,
    #[serde(default)]
    pub min_data_points: Option<usize>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            history_path: default_history_path(),
            persist_history: default_persist_history(),
            analysis_interval_secs: None,
            cleanup_interval_secs: None,
            dedup_window_secs: None,
            metrics: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Layered load: the TOML file first, `SENTINEL_*` variables on top.
    /// A malformed source falls back to defaults with a warning rather than
    /// keeping the daemon down.
    pub fn load() -> anyhow::Result<Self> {
        let file = std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| "sentinel".to_string());
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(config::Environment::with_prefix("SENTINEL"))
            .build()
            .context("building configuration sources")?;

        Ok(settings.try_deserialize().unwrap_or_else(|error| {
            warn!(%error, "malformed configuration, starting with defaults");
            Self::default()
        }))
    }

    /// Engine configuration implied by this daemon configuration.
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default();
        if let Some(secs) = self.analysis_interval_secs {
            engine.analysis_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.cleanup_interval_secs {
            engine.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.dedup_window_secs {
            engine.dedup_window = Duration::from_secs(secs);
        }

        let entries = if self.metrics.is_empty() {
            starter_metrics()
        } else {
            self.metrics.clone()
        };
        for entry in entries {
            let mut metric = MetricConfig::new(entry.category, entry.severity)
                .with_sensitivity(entry.sensitivity)
                .with_patterns(entry.patterns);
            if let Some(min) = entry.min_data_points {
                metric = metric.with_min_data_points(min);
            }
            engine = engine.with_metric(entry.name, metric);
        }
        engine
    }
}

/// Metrics tracked when the configuration defines none: one per pattern
/// detector, so a bare daemon still demonstrates the full detection path.
fn starter_metrics() -> Vec<MetricEntry> {
    vec![
        MetricEntry {
            name: "api_latency_ms".to_string(),
            category: categories::SYSTEM.to_string(),
            severity: AlertSeverity::High,
            sensitivity: Sensitivity::Medium,
            patterns: vec![PatternKind::SustainedHighLatency],
            min_data_points: None,
        },
        MetricEntry {
            name: "trade_pnl".to_string(),
            category: categories::TRADING.to_string(),
            severity: AlertSeverity::High,
            sensitivity: Sensitivity::Medium,
            patterns: vec![PatternKind::ConsecutiveLosses],
            min_data_points: None,
        },
        MetricEntry {
            // Login counts are bursty, so the z-score side stays conservative
            // and the spike pattern carries the detection.
            name: "login_attempts".to_string(),
            category: categories::SECURITY.to_string(),
            severity: AlertSeverity::High,
            sensitivity: Sensitivity::High,
            patterns: vec![PatternKind::LoginSpike],
            min_data_points: None,
        },
        MetricEntry {
            name: "error_rate".to_string(),
            category: categories::SYSTEM.to_string(),
            severity: AlertSeverity::Medium,
            sensitivity: Sensitivity::Low,
            patterns: vec![PatternKind::RisingErrorRate],
            min_data_points: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_track_the_starter_metrics() {
        let config = DaemonConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.persist_history);

        let engine = config.engine_config();
        assert_eq!(engine.metrics.len(), 4);
        assert!(engine.validate().is_ok());

        let logins = engine.metric("login_attempts").unwrap();
        assert_eq!(logins.category, categories::SECURITY);
        assert_eq!(logins.patterns, vec![PatternKind::LoginSpike]);
    }

    #[test]
    fn file_settings_override_the_defaults() {
        let toml = r#"
            port = 9200
            persist_history = false
            dedup_window_secs = 60

            [[metrics]]
            name = "checkout_latency_ms"
            category = "system"
            severity = "HIGH"
            sensitivity = "high"
            patterns = ["sustained_high_latency"]
            min_data_points = 5
        "#;
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let parsed: DaemonConfig = settings.try_deserialize().unwrap();

        assert_eq!(parsed.port, 9200);
        assert!(!parsed.persist_history);

        let engine = parsed.engine_config();
        assert_eq!(engine.dedup_window, Duration::from_secs(60));
        assert_eq!(engine.metrics.len(), 1);
        let metric = engine.metric("checkout_latency_ms").unwrap();
        assert_eq!(metric.severity, AlertSeverity::High);
        assert_eq!(metric.sensitivity, Sensitivity::High);
        assert_eq!(metric.min_data_points, Some(5));
        assert_eq!(engine.min_points_for("checkout_latency_ms"), 5);
    }
}
