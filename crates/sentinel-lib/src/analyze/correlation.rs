//! Cross-metric correlation tracking
//!
//! Metrics that historically move together are remembered as expected pairs.
//! Each cycle recomputes Pearson correlation over the full shared window and
//! over the newest matched points; a tracked pair whose recent behavior
//! diverges from its remembered correlation raises a break.
//!
//! Remembered correlations are sticky: a pair stays tracked after its
//! full-window correlation decays, because that decay is exactly what the
//! break detection has to catch.

use std::collections::HashMap;

use crate::config::CorrelationConfig;
use crate::models::{MetricSample, SeriesSnapshot};

/// A tracked pair whose recent correlation diverged from its remembered one.
#[derive(Debug, Clone)]
pub struct CorrelationBreak {
    pub metric_a: String,
    pub metric_b: String,
    /// Remembered full-window correlation.
    pub expected: f64,
    /// Correlation over the newest matched points.
    pub recent: f64,
    pub delta: f64,
    pub matched_points: usize,
}

/// Stateful pairwise correlation tracker, driven once per analysis cycle.
pub struct CorrelationAnalyzer {
    config: CorrelationConfig,
    /// Pairs with fewer matched points than this are ignored entirely.
    min_matched: usize,
    /// Remembered correlation per name-ordered pair.
    expected: HashMap<(String, String), f64>,
}

impl CorrelationAnalyzer {
    pub fn new(config: CorrelationConfig, min_matched: usize) -> Self {
        Self {
            config,
            min_matched,
            expected: HashMap::new(),
        }
    }

    /// One pass over every metric pair: refresh remembered correlations and
    /// collect breaks.
    pub fn analyze(&mut self, snapshots: &[SeriesSnapshot]) -> Vec<CorrelationBreak> {
        let mut ordered: Vec<&SeriesSnapshot> = snapshots.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut breaks = Vec::new();
        for (i, a) in ordered.iter().enumerate() {
            for b in ordered.iter().skip(i + 1) {
                let matched = self.align(&a.samples, &b.samples);
                if matched.len() < self.min_matched {
                    continue;
                }
                let Some(full) = pearson(&matched) else {
                    continue;
                };

                let key = (a.name.clone(), b.name.clone());
                if full.abs() > self.config.expected_threshold {
                    self.expected.insert(key.clone(), full);
                }
                let Some(&expected) = self.expected.get(&key) else {
                    continue;
                };

                let recent_start = matched.len().saturating_sub(self.config.recent_points);
                let Some(recent) = pearson(&matched[recent_start..]) else {
                    continue;
                };
                let delta = (expected - recent).abs();
                if delta > self.config.break_delta {
                    breaks.push(CorrelationBreak {
                        metric_a: a.name.clone(),
                        metric_b: b.name.clone(),
                        expected,
                        recent,
                        delta,
                        matched_points: matched.len(),
                    });
                }
            }
        }
        breaks
    }

    /// Number of pairs currently remembered as correlated.
    pub fn tracked_pairs(&self) -> usize {
        self.expected.len()
    }

    /// Pair up samples from two series whose timestamps fall within the
    /// match tolerance. Both inputs are oldest first; unmatched samples on
    /// either side are dropped.
    fn align(&self, a: &[MetricSample], b: &[MetricSample]) -> Vec<(f64, f64)> {
        let tolerance_ms = self.config.match_tolerance.as_millis() as i64;
        let mut matched = Vec::new();
        let mut i = 0;
        let mut j = 0;
        while i < a.len() && j < b.len() {
            let delta_ms = (a[i].timestamp - b[j].timestamp).num_milliseconds();
            if delta_ms.abs() <= tolerance_ms {
                matched.push((a[i].value, b[j].value));
                i += 1;
                j += 1;
            } else if delta_ms < 0 {
                i += 1;
            } else {
                j += 1;
            }
        }
        matched
    }
}

/// Pearson correlation coefficient. `None` when either side has no variance,
/// where the coefficient is undefined.
fn pearson(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_yy = 0.0;
    for (x, y) in points {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
        sum_yy += y * y;
    }

    let covariance = n * sum_xy - sum_x * sum_y;
    let variance_x = n * sum_xx - sum_x * sum_x;
    let variance_y = n * sum_yy - sum_y * sum_y;
    let denominator = (variance_x * variance_y).sqrt();
    if denominator < f64::EPSILON {
        return None;
    }
    Some(covariance / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SampleMetadata, SeriesStats};
    use chrono::{TimeZone, Utc};

    fn base_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn snapshot(name: &str, values: &[f64], offset_secs: i64) -> SeriesSnapshot {
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                MetricSample::at(
                    name,
                    *v,
                    base_time() + chrono::Duration::seconds(offset_secs + i as i64 * 60),
                    SampleMetadata::new(),
                )
            })
            .collect();
        SeriesSnapshot {
            name: name.to_string(),
            samples,
            stats: SeriesStats::empty(Utc::now()),
        }
    }

    fn analyzer() -> CorrelationAnalyzer {
        CorrelationAnalyzer::new(CorrelationConfig::default(), 10)
    }

    #[test]
    fn correlated_pair_becomes_tracked_without_breaking() {
        let a: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..40).map(|i| 2.0 * i as f64).collect();

        let mut analyzer = analyzer();
        let breaks = analyzer.analyze(&[snapshot("a", &a, 0), snapshot("b", &b, 0)]);
        assert!(breaks.is_empty());
        assert_eq!(analyzer.tracked_pairs(), 1);
    }

    #[test]
    fn diverging_tail_breaks_a_tracked_pair() {
        let a: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let b_correlated: Vec<f64> = (0..60).map(|i| 2.0 * i as f64).collect();

        let mut analyzer = analyzer();
        analyzer.analyze(&[snapshot("a", &a, 0), snapshot("b", &b_correlated, 0)]);
        assert_eq!(analyzer.tracked_pairs(), 1);

        // Same pair one cycle later: the newest 30 points move opposite,
        // dragging the full-window correlation under the tracking threshold.
        // The remembered correlation must survive and flag the break.
        let b_diverged: Vec<f64> = (0..60)
            .map(|i| {
                if i < 30 {
                    2.0 * i as f64
                } else {
                    2.0 * (60 - i) as f64
                }
            })
            .collect();
        let breaks = analyzer.analyze(&[snapshot("a", &a, 0), snapshot("b", &b_diverged, 0)]);

        assert_eq!(breaks.len(), 1);
        let brk = &breaks[0];
        assert_eq!(brk.metric_a, "a");
        assert_eq!(brk.metric_b, "b");
        assert!(brk.expected > 0.99);
        assert!(brk.recent < -0.99);
        assert!(brk.delta > 1.9);
        assert_eq!(brk.matched_points, 60);
    }

    #[test]
    fn sparse_pairs_are_ignored() {
        let a: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..5).map(|i| 2.0 * i as f64).collect();

        let mut analyzer = analyzer();
        let breaks = analyzer.analyze(&[snapshot("a", &a, 0), snapshot("b", &b, 0)]);
        assert!(breaks.is_empty());
        assert_eq!(analyzer.tracked_pairs(), 0);
    }

    #[test]
    fn flat_series_has_no_defined_correlation() {
        let a: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let b = vec![5.0; 40];

        let mut analyzer = analyzer();
        analyzer.analyze(&[snapshot("a", &a, 0), snapshot("b", &b, 0)]);
        assert_eq!(analyzer.tracked_pairs(), 0);
    }

    #[test]
    fn alignment_tolerates_small_offsets_and_drops_the_rest() {
        let analyzer = analyzer();

        // 30s offset matches, 90s offset does not.
        let a = snapshot("a", &[1.0, 2.0, 3.0], 0);
        let close = snapshot("b", &[1.0, 2.0, 3.0], 30);
        assert_eq!(analyzer.align(&a.samples, &close.samples).len(), 3);

        let far = snapshot("b", &[1.0, 2.0, 3.0], 90);
        // Each a[i] is 90s from b[i] but 30s from b[i-1]; the two-pointer
        // walk pairs a[1] with b[0] and a[2] with b[1].
        let matched = analyzer.align(&a.samples, &far.samples);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0], (2.0, 1.0));
    }

    #[test]
    fn alignment_skips_samples_missing_on_one_side() {
        let analyzer = analyzer();
        // b only has every other minute. The walk is greedy: each b sample
        // pairs with the first a sample inside tolerance, and the stranded a
        // samples are dropped.
        let a = snapshot("a", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 0);
        let b_values: Vec<f64> = vec![10.0, 30.0, 50.0];
        let b_samples: Vec<MetricSample> = b_values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                MetricSample::at(
                    "b",
                    *v,
                    base_time() + chrono::Duration::seconds(i as i64 * 120),
                    SampleMetadata::new(),
                )
            })
            .collect();

        let matched = analyzer.align(&a.samples, &b_samples);
        assert_eq!(matched, vec![(1.0, 10.0), (2.0, 30.0), (4.0, 50.0)]);
    }

    #[test]
    fn pearson_signs_match_the_relationship() {
        let direct: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, 3.0 * i as f64 + 1.0)).collect();
        assert!((pearson(&direct).unwrap() - 1.0).abs() < 1e-9);

        let inverse: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, -(i as f64))).collect();
        assert!((pearson(&inverse).unwrap() + 1.0).abs() < 1e-9);

        let degenerate = vec![(1.0, 5.0); 20];
        assert!(pearson(&degenerate).is_none());
    }
}
