//! Core data models for the metric side of the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to a sample by its producer.
pub type SampleMetadata = serde_json::Map<String, serde_json::Value>;

/// A single timestamped observation of a named metric.
///
/// Immutable once recorded; owned by the series that stores it and discarded
/// when it ages out of the rolling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "SampleMetadata::is_empty")]
    pub metadata: SampleMetadata,
}

impl MetricSample {
    /// Build a sample stamped with the current time.
    pub fn new(name: impl Into<String>, value: f64, metadata: SampleMetadata) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Build a sample with an explicit timestamp (backfill and tests).
    pub fn at(
        name: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
        metadata: SampleMetadata,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
            metadata,
        }
    }
}

/// Direction of a series over its recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Stable,
    Increasing,
    Decreasing,
    InsufficientData,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trend::Stable => "stable",
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::InsufficientData => "insufficient_data",
        };
        f.write_str(s)
    }
}

/// Statistics derived from a series' surviving window, recomputed on every
/// insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub trend: Trend,
    pub last_updated: DateTime<Utc>,
}

impl SeriesStats {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            mean: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            count: 0,
            trend: Trend::InsufficientData,
            last_updated: now,
        }
    }
}

/// Longer-lived reference statistics for one metric, refreshed by the
/// analysis cycle and used to judge whether a forecast is concerning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub sample_size: usize,
    pub updated_at: DateTime<Utc>,
}

impl Baseline {
    pub fn from_stats(stats: &SeriesStats) -> Self {
        Self {
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
            sample_size: stats.count,
            updated_at: stats.last_updated,
        }
    }
}

/// Point-in-time copy of one series, taken under its lock, handed to the
/// periodic analyzers so they never hold ingestion locks while computing.
#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    pub name: String,
    pub samples: Vec<MetricSample>,
    pub stats: SeriesStats,
}

/// What an insert produced: the refreshed statistics, whether the series has
/// enough data for detection, and the most recent samples (newest last)
/// captured under the same lock as the insert.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub stats: SeriesStats,
    pub ready: bool,
    pub recent: Vec<MetricSample>,
}
