//! Engine configuration
//!
//! Everything the engine consults at runtime is fixed at construction time
//! into one immutable [`EngineConfig`]: the tracked metric set, per-severity
//! alert policies, the escalation ladder, analysis windows and cadences.
//! There is no module-level mutable configuration, so independent engine
//! instances can coexist in one process.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::{AlertSeverity, ChannelKind};
use crate::detect::PatternKind;
use crate::error::EngineError;

/// Default rolling window for series statistics (1 hour).
pub const DEFAULT_BASELINE_WINDOW: Duration = Duration::from_millis(3_600_000);

/// Default number of samples a series needs before detection runs.
pub const DEFAULT_MIN_DATA_POINTS: usize = 10;

/// Default cadence of the predictive/correlation cycle.
pub const DEFAULT_ANALYSIS_INTERVAL: Duration = Duration::from_secs(60);

/// Default forecast horizon for the predictive pass (5 minutes).
pub const DEFAULT_FORECAST_HORIZON: Duration = Duration::from_secs(300);

/// Default window in which a same-category, same-title alert is a duplicate.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// Default retention for resolved-alert history (7 days).
pub const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default cadence of the trim/persist cleanup task.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Size of deviation a metric reacts to: `Low` fires on small (1.5σ)
/// deviations, `High` only on large (2.5σ) ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Number of standard deviations a sample must deviate to count as
    /// anomalous.
    pub fn sigma_threshold(self) -> f64 {
        match self {
            Sensitivity::Low => 1.5,
            Sensitivity::Medium => 2.0,
            Sensitivity::High => 2.5,
        }
    }
}

/// Per-metric detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Category stamped on statistical-path alerts for this metric.
    pub category: String,
    /// Severity of statistical-path alerts for this metric.
    pub severity: AlertSeverity,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    /// Pattern detectors evaluated on every accepted sample.
    #[serde(default)]
    pub patterns: Vec<PatternKind>,
    /// Overrides the engine-wide minimum sample gate for this metric.
    #[serde(default)]
    pub min_data_points: Option<usize>,
}

impl MetricConfig {
    pub fn new(category: impl Into<String>, severity: AlertSeverity) -> Self {
        Self {
            category: category.into(),
            severity,
            sensitivity: Sensitivity::default(),
            patterns: Vec::new(),
            min_data_points: None,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<PatternKind>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_min_data_points(mut self, min: usize) -> Self {
        self.min_data_points = Some(min);
        self
    }
}

/// Notification and escalation policy for one alert severity.
///
/// Snapshotted into every alert at creation; changing configuration never
/// reaches alerts already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPolicy {
    /// Operator-facing priority rank (1 = most urgent).
    pub priority: u8,
    /// Escalation cadence; auto-resolve fires at twice this.
    pub escalation_time: Duration,
    /// Channels notified on creation.
    pub channels: Vec<ChannelKind>,
    /// Resolve automatically after `2 × escalation_time` without operator
    /// action.
    pub auto_resolve: bool,
    /// Escalate through the ladder until acknowledged.
    pub require_acknowledgment: bool,
}

/// One tier of the escalation ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationLevel {
    pub level: u32,
    /// Who is paged at this tier; named in the escalation notice.
    pub contacts: Vec<String>,
    /// Channels the forced-critical escalation notice goes to.
    pub channels: Vec<ChannelKind>,
    /// Expected operator response time for this tier, shown in the notice.
    pub delay: Duration,
}

/// Settings for the cross-metric correlation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Two samples from different series pair up when their timestamps are
    /// within this tolerance.
    pub match_tolerance: Duration,
    /// |Pearson r| over the full window above which a pair counts as
    /// expected-correlated.
    pub expected_threshold: f64,
    /// |expected − recent| above which a tracked pair raises a break alert.
    pub break_delta: f64,
    /// Size of the recent window, in matched points.
    pub recent_points: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            match_tolerance: Duration::from_secs(60),
            expected_threshold: 0.8,
            break_delta: 0.3,
            recent_points: 30,
        }
    }
}

/// Immutable engine configuration, injected at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sliding window samples survive in (default 1 hour).
    pub baseline_window: Duration,
    /// Hard gate: no detection below this many samples (default 10).
    pub min_data_points: usize,
    pub analysis_interval: Duration,
    pub forecast_horizon: Duration,
    pub dedup_window: Duration,
    pub history_retention: Duration,
    pub cleanup_interval: Duration,
    pub correlation: CorrelationConfig,
    /// Tracked metrics; samples for any other name are rejected.
    pub metrics: HashMap<String, MetricConfig>,
    /// Policy per severity, snapshotted into alerts at creation.
    pub policies: HashMap<AlertSeverity, AlertPolicy>,
    /// Escalation ladder, ascending; empty disables escalation.
    pub escalation_levels: Vec<EscalationLevel>,
    /// Channels the dispatcher will actually attempt.
    pub enabled_channels: HashSet<ChannelKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_window: DEFAULT_BASELINE_WINDOW,
            min_data_points: DEFAULT_MIN_DATA_POINTS,
            analysis_interval: DEFAULT_ANALYSIS_INTERVAL,
            forecast_horizon: DEFAULT_FORECAST_HORIZON,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            history_retention: DEFAULT_HISTORY_RETENTION,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            correlation: CorrelationConfig::default(),
            metrics: HashMap::new(),
            policies: default_policies(),
            escalation_levels: default_escalation_levels(),
            enabled_channels: ChannelKind::all().into_iter().collect(),
        }
    }
}

impl EngineConfig {
    /// Register a tracked metric (chainable; used heavily at assembly time).
    pub fn with_metric(mut self, name: impl Into<String>, config: MetricConfig) -> Self {
        self.metrics.insert(name.into(), config);
        self
    }

    pub fn metric(&self, name: &str) -> Option<&MetricConfig> {
        self.metrics.get(name)
    }

    pub fn policy(&self, severity: AlertSeverity) -> Option<&AlertPolicy> {
        self.policies.get(&severity)
    }

    /// Minimum sample gate for a metric: its own override or the engine-wide
    /// default.
    pub fn min_points_for(&self, name: &str) -> usize {
        self.metrics
            .get(name)
            .and_then(|m| m.min_data_points)
            .unwrap_or(self.min_data_points)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min_data_points == 0 {
            return Err(EngineError::Configuration(
                "min_data_points must be at least 1".to_string(),
            ));
        }
        if self.baseline_window.is_zero() || self.analysis_interval.is_zero() {
            return Err(EngineError::Configuration(
                "baseline_window and analysis_interval must be non-zero".to_string(),
            ));
        }
        if self.dedup_window.is_zero() {
            return Err(EngineError::Configuration(
                "dedup_window must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.correlation.expected_threshold)
            || self.correlation.expected_threshold == 0.0
        {
            return Err(EngineError::Configuration(
                "correlation.expected_threshold must be in (0, 1]".to_string(),
            ));
        }
        if self.correlation.break_delta <= 0.0 {
            return Err(EngineError::Configuration(
                "correlation.break_delta must be positive".to_string(),
            ));
        }
        if self.correlation.recent_points < 2 {
            return Err(EngineError::Configuration(
                "correlation.recent_points must be at least 2".to_string(),
            ));
        }
        for severity in AlertSeverity::all() {
            if !self.policies.contains_key(&severity) {
                return Err(EngineError::Configuration(format!(
                    "no alert policy configured for severity {severity}"
                )));
            }
        }
        for (name, metric) in &self.metrics {
            if metric.category.trim().is_empty() {
                return Err(EngineError::Configuration(format!(
                    "metric '{name}' has an empty category"
                )));
            }
            if matches!(metric.min_data_points, Some(0)) {
                return Err(EngineError::Configuration(format!(
                    "metric '{name}' overrides min_data_points to 0"
                )));
            }
        }
        for (idx, level) in self.escalation_levels.iter().enumerate() {
            let expected = idx as u32 + 1;
            if level.level != expected {
                return Err(EngineError::Configuration(format!(
                    "escalation levels must ascend from 1; found level {} at position {}",
                    level.level, idx
                )));
            }
        }
        Ok(())
    }
}

fn default_policies() -> HashMap<AlertSeverity, AlertPolicy> {
    let mut policies = HashMap::new();
    policies.insert(
        AlertSeverity::Critical,
        AlertPolicy {
            priority: 1,
            escalation_time: Duration::from_secs(5 * 60),
            channels: vec![ChannelKind::Email, ChannelKind::Sms, ChannelKind::Dashboard],
            auto_resolve: false,
            require_acknowledgment: true,
        },
    );
    policies.insert(
        AlertSeverity::High,
        AlertPolicy {
            priority: 2,
            escalation_time: Duration::from_secs(15 * 60),
            channels: vec![
                ChannelKind::Email,
                ChannelKind::Webhook,
                ChannelKind::Dashboard,
            ],
            auto_resolve: false,
            require_acknowledgment: true,
        },
    );
    policies.insert(
        AlertSeverity::Medium,
        AlertPolicy {
            priority: 3,
            escalation_time: Duration::from_secs(30 * 60),
            channels: vec![ChannelKind::Email, ChannelKind::Dashboard],
            auto_resolve: true,
            require_acknowledgment: false,
        },
    );
    policies.insert(
        AlertSeverity::Low,
        AlertPolicy {
            priority: 4,
            escalation_time: Duration::from_secs(60 * 60),
            channels: vec![ChannelKind::Dashboard],
            auto_resolve: true,
            require_acknowledgment: false,
        },
    );
    policies
}

fn default_escalation_levels() -> Vec<EscalationLevel> {
    vec![
        EscalationLevel {
            level: 1,
            contacts: vec!["oncall-primary".to_string()],
            channels: vec![ChannelKind::Email, ChannelKind::Dashboard],
            delay: Duration::from_secs(15 * 60),
        },
        EscalationLevel {
            level: 2,
            contacts: vec!["oncall-secondary".to_string(), "team-lead".to_string()],
            channels: vec![ChannelKind::Email, ChannelKind::Sms],
            delay: Duration::from_secs(30 * 60),
        },
        EscalationLevel {
            level: 3,
            contacts: vec!["engineering-manager".to_string()],
            channels: vec![ChannelKind::Email, ChannelKind::Sms, ChannelKind::Webhook],
            delay: Duration::from_secs(60 * 60),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_data_points, 10);
        assert_eq!(config.baseline_window, Duration::from_millis(3_600_000));
        for severity in AlertSeverity::all() {
            assert!(config.policy(severity).is_some());
        }
    }

    #[test]
    fn sensitivity_maps_to_sigma() {
        assert_eq!(Sensitivity::Low.sigma_threshold(), 1.5);
        assert_eq!(Sensitivity::Medium.sigma_threshold(), 2.0);
        assert_eq!(Sensitivity::High.sigma_threshold(), 2.5);
    }

    #[test]
    fn metric_override_wins_over_engine_default() {
        let config = EngineConfig::default().with_metric(
            "pnl",
            MetricConfig::new("trading", AlertSeverity::High).with_min_data_points(5),
        );
        assert_eq!(config.min_points_for("pnl"), 5);
        assert_eq!(config.min_points_for("latency"), 10);
    }

    #[test]
    fn rejects_zero_min_data_points() {
        let config = EngineConfig {
            min_data_points: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_out_of_order_escalation_levels() {
        let mut config = EngineConfig::default();
        config.escalation_levels[1].level = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_policy() {
        let mut config = EngineConfig::default();
        config.policies.remove(&AlertSeverity::Medium);
        assert!(matches!(
            config.validate(),
            Err(EngineError::Configuration(_))
        ));
    }
}
