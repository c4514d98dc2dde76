//! Short-term trend extrapolation
//!
//! Fits an ordinary least squares line through the newest samples of a series
//! and evaluates it a few minutes ahead. A forecast is only concerning when
//! the series itself is stable enough to trust the fit and the projected
//! value sits far outside the baseline.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{Baseline, MetricSample};

/// How many trailing samples the regression is fit over.
pub const FORECAST_SAMPLE_COUNT: usize = 10;

/// Forecasts below this confidence are never concerning.
const MIN_CONFIDENCE: f64 = 0.5;

/// Standard deviations a projection must sit from the baseline mean to be
/// concerning.
const CONCERN_SIGMA: f64 = 3.0;

/// A projected value for one metric at the forecast horizon.
#[derive(Debug, Clone)]
pub struct Forecast {
    pub metric: String,
    pub predicted: f64,
    pub slope_per_sec: f64,
    /// Stability of the fitted window: 1 minus its coefficient of variation,
    /// clamped to [0, 1]. Noisy or steeply moving windows score low.
    pub confidence: f64,
    /// Distance of the projection from the baseline mean, in baseline
    /// standard deviations.
    pub sigma_distance: f64,
    pub horizon: Duration,
    pub concerning: bool,
}

/// Extrapolates series trends over a fixed horizon.
pub struct TrendForecaster {
    horizon: Duration,
}

impl TrendForecaster {
    pub fn new(horizon: Duration) -> Self {
        Self { horizon }
    }

    /// Fit the newest [`FORECAST_SAMPLE_COUNT`] samples and project to
    /// `now + horizon`. `samples` must be oldest first. Returns `None` below
    /// two samples, where no line exists.
    pub fn forecast(
        &self,
        name: &str,
        samples: &[MetricSample],
        baseline: &Baseline,
        now: DateTime<Utc>,
    ) -> Option<Forecast> {
        let tail_start = samples.len().saturating_sub(FORECAST_SAMPLE_COUNT);
        let tail = &samples[tail_start..];
        if tail.len() < 2 {
            return None;
        }

        // Normalize timestamps to the first tail sample to keep the sums
        // well conditioned.
        let t0 = tail[0].timestamp;
        let xs: Vec<f64> = tail
            .iter()
            .map(|s| (s.timestamp - t0).num_milliseconds() as f64 / 1000.0)
            .collect();
        let ys: Vec<f64> = tail.iter().map(|s| s.value).collect();

        let (slope, intercept) = fit_line(&xs, &ys);
        let x_target = (now - t0).num_milliseconds() as f64 / 1000.0 + self.horizon.as_secs_f64();
        let predicted = slope * x_target + intercept;

        let confidence = relative_stability(&ys);
        let sigma_distance = (predicted - baseline.mean).abs() / baseline.std_dev.max(f64::EPSILON);
        let concerning = confidence >= MIN_CONFIDENCE && sigma_distance > CONCERN_SIGMA;

        Some(Forecast {
            metric: name.to_string(),
            predicted,
            slope_per_sec: slope,
            confidence,
            sigma_distance,
            horizon: self.horizon,
            concerning,
        })
    }
}

/// Least squares slope and intercept. Falls back to a flat line through the
/// mean when all x values coincide.
fn fit_line(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return (0.0, sum_y / n);
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    (slope, intercept)
}

/// 1 minus the coefficient of variation of the fitted window, clamped to
/// [0, 1]. A window whose mean sits at zero has no meaningful scale and
/// scores 0.
fn relative_stability(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let mean = ys.iter().sum::<f64>() / n;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    let variance = ys.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (1.0 - variance.sqrt() / mean.abs()).clamp(0.0, 1.0)
}
