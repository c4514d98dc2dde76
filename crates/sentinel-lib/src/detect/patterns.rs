//! Named behavioral detectors
//!
//! Each detector encodes one operational failure shape with fixed thresholds.
//! They run per-sample against the series baseline and recent tail, and a hit
//! carries everything needed to render an alert without re-reading the series.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::alerts::AlertSeverity;
use crate::models::{MetricSample, SeriesStats, Trend};

/// Current sample must exceed this multiple of the mean for latency to count
/// as elevated at all.
const LATENCY_CURRENT_FACTOR: f64 = 2.0;
/// Samples past this multiple of the mean count toward the sustained breach.
const LATENCY_SUSTAINED_FACTOR: f64 = 1.5;
const LATENCY_RECENT_WINDOW: usize = 5;
const LATENCY_BREACH_COUNT: usize = 3;

const LOSS_LOOKBACK: usize = 10;
const LOSS_STREAK_THRESHOLD: usize = 5;

const LOGIN_SPIKE_FACTOR: f64 = 3.0;

const ERROR_RATE_FACTOR: f64 = 1.5;

/// The behavioral shapes the engine knows how to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    SustainedHighLatency,
    ConsecutiveLosses,
    LoginSpike,
    RisingErrorRate,
}

impl PatternKind {
    pub fn id(&self) -> &'static str {
        match self {
            PatternKind::SustainedHighLatency => "sustained_high_latency",
            PatternKind::ConsecutiveLosses => "consecutive_losses",
            PatternKind::LoginSpike => "login_spike",
            PatternKind::RisingErrorRate => "rising_error_rate",
        }
    }

    /// Runs this detector against the sample that was just recorded.
    ///
    /// `recent` is the series tail in oldest-first order and includes the
    /// current sample as its last element.
    pub fn evaluate(
        &self,
        sample: &MetricSample,
        stats: &SeriesStats,
        recent: &[MetricSample],
    ) -> Option<PatternHit> {
        match self {
            PatternKind::SustainedHighLatency => sustained_high_latency(sample, stats, recent),
            PatternKind::ConsecutiveLosses => consecutive_losses(recent),
            PatternKind::LoginSpike => login_spike(sample, stats),
            PatternKind::RisingErrorRate => rising_error_rate(sample, stats),
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A detector that fired, with the evidence it fired on.
#[derive(Debug, Clone)]
pub struct PatternHit {
    pub pattern: PatternKind,
    pub severity: AlertSeverity,
    pub description: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Latency is pathological when the current sample is past double the mean
/// and the elevation is sustained, not a one-off: at least 3 of the last 5
/// samples above 1.5x the mean.
fn sustained_high_latency(
    sample: &MetricSample,
    stats: &SeriesStats,
    recent: &[MetricSample],
) -> Option<PatternHit> {
    if sample.value <= stats.mean * LATENCY_CURRENT_FACTOR {
        return None;
    }
    let sustained_floor = stats.mean * LATENCY_SUSTAINED_FACTOR;
    let breaches = recent
        .iter()
        .rev()
        .take(LATENCY_RECENT_WINDOW)
        .filter(|s| s.value > sustained_floor)
        .count();
    if breaches < LATENCY_BREACH_COUNT {
        return None;
    }

    let mut data = serde_json::Map::new();
    data.insert("observed".into(), json!(sample.value));
    data.insert("baseline_mean".into(), json!(stats.mean));
    data.insert("breaches_in_window".into(), json!(breaches));
    Some(PatternHit {
        pattern: PatternKind::SustainedHighLatency,
        severity: AlertSeverity::High,
        description: format!(
            "{} held at {:.2}, over double its baseline mean of {:.2} ({} of the last {} samples elevated)",
            sample.name, sample.value, stats.mean, breaches, LATENCY_RECENT_WINDOW
        ),
        data,
    })
}

/// An unbroken run of negative samples at the end of the series. Fires once
/// the suffix reaches 5 of the last 10 samples.
fn consecutive_losses(recent: &[MetricSample]) -> Option<PatternHit> {
    let streak: Vec<f64> = recent
        .iter()
        .rev()
        .take(LOSS_LOOKBACK)
        .take_while(|s| s.value < 0.0)
        .map(|s| s.value)
        .collect();
    if streak.len() < LOSS_STREAK_THRESHOLD {
        return None;
    }
    let total_loss: f64 = streak.iter().sum();
    let name = recent.last().map(|s| s.name.as_str()).unwrap_or("series");

    let mut data = serde_json::Map::new();
    data.insert("streak".into(), json!(streak.len()));
    data.insert("total_loss".into(), json!(total_loss));
    Some(PatternHit {
        pattern: PatternKind::ConsecutiveLosses,
        severity: AlertSeverity::Critical,
        description: format!(
            "{} lost on {} consecutive samples, totaling {:.2}",
            name,
            streak.len(),
            total_loss
        ),
        data,
    })
}

/// A single sample more than triple the baseline mean. Unlike the latency
/// detector this has no sustain requirement, a lone burst is the signal.
fn login_spike(sample: &MetricSample, stats: &SeriesStats) -> Option<PatternHit> {
    if sample.value <= stats.mean * LOGIN_SPIKE_FACTOR {
        return None;
    }

    let mut data = serde_json::Map::new();
    data.insert("observed".into(), json!(sample.value));
    data.insert("baseline_mean".into(), json!(stats.mean));
    if stats.mean.abs() > f64::EPSILON {
        data.insert("ratio".into(), json!(sample.value / stats.mean));
    }
    Some(PatternHit {
        pattern: PatternKind::LoginSpike,
        severity: AlertSeverity::Critical,
        description: format!(
            "{} spiked to {:.2}, more than triple its baseline mean of {:.2}",
            sample.name, sample.value, stats.mean
        ),
        data,
    })
}

/// Error rate climbing and already well above baseline. Requires the series
/// trend itself to be increasing so a noisy-but-flat series does not fire.
fn rising_error_rate(sample: &MetricSample, stats: &SeriesStats) -> Option<PatternHit> {
    if stats.trend != Trend::Increasing {
        return None;
    }
    if sample.value <= stats.mean * ERROR_RATE_FACTOR {
        return None;
    }

    let mut data = serde_json::Map::new();
    data.insert("observed".into(), json!(sample.value));
    data.insert("baseline_mean".into(), json!(stats.mean));
    data.insert("trend".into(), json!(stats.trend.to_string()));
    Some(PatternHit {
        pattern: PatternKind::RisingErrorRate,
        severity: AlertSeverity::High,
        description: format!(
            "{} is trending up and sitting at {:.2}, past 1.5x its baseline mean of {:.2}",
            sample.name, sample.value, stats.mean
        ),
        data,
    })
}
