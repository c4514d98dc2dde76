//! Z-score scoring of incoming samples
//!
//! Deliberately a simple, explainable statistic rather than a learned model,
//! so operators can reason about why a sample fired.

use crate::config::Sensitivity;
use crate::models::SeriesStats;

/// Outcome of scoring one sample against its series.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyScore {
    /// Deviations from the mean, with the denominator floored at 1.0 so a
    /// flat series cannot divide by zero.
    pub score: f64,
    /// Sigma threshold the score was compared against.
    pub threshold: f64,
    pub is_anomaly: bool,
}

/// Scores samples against their series' current statistics.
pub struct AnomalyScorer;

impl AnomalyScorer {
    pub fn evaluate(&self, value: f64, stats: &SeriesStats, sensitivity: Sensitivity) -> AnomalyScore {
        let threshold = sensitivity.sigma_threshold();
        let score = (value - stats.mean).abs() / stats.std_dev.max(1.0);
        AnomalyScore {
            score,
            threshold,
            is_anomaly: score > threshold,
        }
    }
}
