//! Periodic cross-series analysis
//!
//! Everything here runs on the scheduler's cadence rather than per sample:
//! baseline refresh, short-term trend extrapolation, and cross-metric
//! correlation tracking. The per-sample detectors live in [`crate::detect`].

mod correlation;
mod predictive;
mod scheduler;

pub use correlation::{CorrelationAnalyzer, CorrelationBreak};
pub use predictive::{Forecast, TrendForecaster, FORECAST_SAMPLE_COUNT};
pub use scheduler::{AnalysisScheduler, SchedulerStats};
