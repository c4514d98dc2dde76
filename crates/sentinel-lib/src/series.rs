//! Rolling per-metric sample windows and derived statistics
//!
//! Every tracked metric owns a time-capped window of samples. Statistics are
//! recomputed on every insert; eviction is driven by the incoming sample's
//! timestamp so replayed/backfilled data behaves the same as live data. The
//! store sits behind [`SeriesRepo`] so a persistent backend can substitute
//! without touching detection logic.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{MetricSample, RecordOutcome, SeriesSnapshot, SeriesStats, Trend};

/// How many trailing samples detection sees alongside a new insert. Covers
/// the widest pattern lookback (loss streaks over the last 10).
pub const DETECTION_LOOKBACK: usize = 10;

/// Relative change between window thirds that counts as a trend.
const TREND_CHANGE_RATIO: f64 = 0.05;

/// Storage seam for tracked metric series.
#[async_trait]
pub trait SeriesRepo: Send + Sync {
    /// Names of all tracked metrics. Fixed at startup.
    fn metric_names(&self) -> Vec<String>;

    /// Append a sample to its series, evict expired samples, recompute
    /// statistics. Rejects names outside the tracked set.
    async fn record(&self, sample: MetricSample) -> Result<RecordOutcome, EngineError>;

    /// Current statistics for one series.
    async fn stats(&self, name: &str) -> Result<SeriesStats, EngineError>;

    /// The `n` newest samples, oldest first.
    async fn recent(&self, name: &str, n: usize) -> Result<Vec<MetricSample>, EngineError>;

    /// Full copy of one series for the periodic analyzers. Snapshots are
    /// taken one series at a time; callers never hold two series locks.
    async fn snapshot(&self, name: &str) -> Result<SeriesSnapshot, EngineError>;

    /// Evict expired samples on every series (idle series do not see
    /// inserts, so the cleanup task sweeps them). Returns evicted count.
    async fn trim_expired(&self) -> usize;
}

/// One metric's rolling window plus derived statistics.
#[derive(Debug, Clone)]
pub struct MetricSeries {
    name: String,
    window: chrono::Duration,
    min_points: usize,
    samples: VecDeque<MetricSample>,
    stats: SeriesStats,
}

impl MetricSeries {
    pub fn new(name: impl Into<String>, window: std::time::Duration, min_points: usize) -> Self {
        Self {
            name: name.into(),
            window: chrono::Duration::milliseconds(window.as_millis() as i64),
            min_points,
            samples: VecDeque::new(),
            stats: SeriesStats::empty(Utc::now()),
        }
    }

    /// Append one sample: expire, insert, recompute.
    pub fn push(&mut self, sample: MetricSample) -> RecordOutcome {
        self.expire_older_than(sample.timestamp - self.window);
        let timestamp = sample.timestamp;
        self.samples.push_back(sample);
        self.recalculate(timestamp);

        RecordOutcome {
            stats: self.stats.clone(),
            ready: self.samples.len() >= self.min_points,
            recent: self.tail(DETECTION_LOOKBACK),
        }
    }

    /// Cleanup-path eviction for series that stopped receiving inserts.
    pub fn trim(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.samples.len();
        self.expire_older_than(now - self.window);
        let evicted = before - self.samples.len();
        if evicted > 0 {
            self.recalculate(now);
        }
        evicted
    }

    pub fn stats(&self) -> &SeriesStats {
        &self.stats
    }

    /// The `n` newest samples, oldest first.
    pub fn tail(&self, n: usize) -> Vec<MetricSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            name: self.name.clone(),
            samples: self.samples.iter().cloned().collect(),
            stats: self.stats.clone(),
        }
    }

    fn expire_older_than(&mut self, cutoff: DateTime<Utc>) {
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn recalculate(&mut self, last_updated: DateTime<Utc>) {
        let count = self.samples.len();
        if count == 0 {
            self.stats = SeriesStats::empty(last_updated);
            return;
        }

        let sum: f64 = self.samples.iter().map(|s| s.value).sum();
        let mean = sum / count as f64;

        // Two-pass sample variance for numerical stability.
        let std_dev = if count > 1 {
            let variance = self
                .samples
                .iter()
                .map(|s| (s.value - mean).powi(2))
                .sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for sample in &self.samples {
            min = min.min(sample.value);
            max = max.max(sample.value);
        }

        self.stats = SeriesStats {
            mean,
            std_dev,
            min,
            max,
            count,
            trend: self.compute_trend(),
            last_updated,
        };
    }

    /// Mean of the newest third vs the third before it; a ≥5% relative
    /// change in either direction is a trend.
    fn compute_trend(&self) -> Trend {
        let count = self.samples.len();
        if count < 3 {
            return Trend::InsufficientData;
        }

        let third = count / 3;
        let recent_mean = self.mean_of(count - third, count);
        let previous_mean = self.mean_of(count - 2 * third, count - third);

        let change = (recent_mean - previous_mean) / previous_mean.abs().max(f64::EPSILON);
        if change >= TREND_CHANGE_RATIO {
            Trend::Increasing
        } else if change <= -TREND_CHANGE_RATIO {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    fn mean_of(&self, start: usize, end: usize) -> f64 {
        let len = end - start;
        if len == 0 {
            return 0.0;
        }
        self.samples
            .iter()
            .skip(start)
            .take(len)
            .map(|s| s.value)
            .sum::<f64>()
            / len as f64
    }
}

/// In-memory series store: one concurrent-map entry per tracked metric, so
/// every series mutates under its own lock.
pub struct InMemorySeriesStore {
    series: DashMap<String, MetricSeries>,
}

impl InMemorySeriesStore {
    /// Build the fixed series set from configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let series = DashMap::new();
        for name in config.metrics.keys() {
            series.insert(
                name.clone(),
                MetricSeries::new(
                    name.clone(),
                    config.baseline_window,
                    config.min_points_for(name),
                ),
            );
        }
        Self { series }
    }
}

#[async_trait]
impl SeriesRepo for InMemorySeriesStore {
    fn metric_names(&self) -> Vec<String> {
        self.series.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn record(&self, sample: MetricSample) -> Result<RecordOutcome, EngineError> {
        let mut entry = self
            .series
            .get_mut(&sample.name)
            .ok_or_else(|| EngineError::UnknownMetric(sample.name.clone()))?;
        Ok(entry.push(sample))
    }

    async fn stats(&self, name: &str) -> Result<SeriesStats, EngineError> {
        self.series
            .get(name)
            .map(|entry| entry.stats().clone())
            .ok_or_else(|| EngineError::UnknownMetric(name.to_string()))
    }

    async fn recent(&self, name: &str, n: usize) -> Result<Vec<MetricSample>, EngineError> {
        self.series
            .get(name)
            .map(|entry| entry.tail(n))
            .ok_or_else(|| EngineError::UnknownMetric(name.to_string()))
    }

    async fn snapshot(&self, name: &str) -> Result<SeriesSnapshot, EngineError> {
        self.series
            .get(name)
            .map(|entry| entry.snapshot())
            .ok_or_else(|| EngineError::UnknownMetric(name.to_string()))
    }

    async fn trim_expired(&self) -> usize {
        let now = Utc::now();
        let mut evicted = 0;
        for mut entry in self.series.iter_mut() {
            evicted += entry.trim(now);
        }
        evicted
    }
}
