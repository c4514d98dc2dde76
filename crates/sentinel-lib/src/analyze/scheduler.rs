//! Periodic analysis loop
//!
//! Every interval: snapshot all tracked series, refresh baselines, run the
//! trend forecaster, run the correlation tracker, and hand any findings to
//! the alert manager. Snapshots are taken one series at a time so the cycle
//! never holds ingestion locks while computing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::alerts::{
    categories, AlertContext, AlertDraft, AlertManager, AlertSeverity, ContextDetail,
};
use crate::config::EngineConfig;
use crate::models::{Baseline, SeriesSnapshot};
use crate::observability::EngineMetrics;
use crate::series::SeriesRepo;

use super::{CorrelationAnalyzer, CorrelationBreak, Forecast, TrendForecaster};

/// Drives baseline refresh, forecasting, and correlation tracking on the
/// configured cadence.
pub struct AnalysisScheduler {
    config: EngineConfig,
    series: Arc<dyn SeriesRepo>,
    alerts: Arc<AlertManager>,
    forecaster: TrendForecaster,
    correlations: Mutex<CorrelationAnalyzer>,
    baselines: RwLock<HashMap<String, Baseline>>,
    cycles_completed: AtomicU64,
    last_cycle_at: RwLock<Option<DateTime<Utc>>>,
    metrics: EngineMetrics,
}

/// Point-in-time view of the scheduler's progress.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStats {
    pub cycles_completed: u64,
    pub baselines_tracked: usize,
    pub correlated_pairs: usize,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl AnalysisScheduler {
    pub fn new(
        config: EngineConfig,
        series: Arc<dyn SeriesRepo>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        let correlations =
            CorrelationAnalyzer::new(config.correlation.clone(), config.min_data_points);
        Self {
            forecaster: TrendForecaster::new(config.forecast_horizon),
            correlations: Mutex::new(correlations),
            series,
            alerts,
            config,
            baselines: RwLock::new(HashMap::new()),
            cycles_completed: AtomicU64::new(0),
            last_cycle_at: RwLock::new(None),
            metrics: EngineMetrics::new(),
        }
    }

    /// Run the analysis loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.analysis_interval.as_secs(),
            "starting analysis scheduler"
        );

        let mut ticker = interval(self.config.analysis_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("shutting down analysis scheduler");
                    break;
                }
            }
        }
    }

    /// One full pass over every tracked series.
    pub async fn run_cycle(&self) {
        let started = Instant::now();

        let mut snapshots = Vec::new();
        for name in self.series.metric_names() {
            match self.series.snapshot(&name).await {
                Ok(snap) => snapshots.push(snap),
                Err(error) => debug!(metric = %name, %error, "series vanished mid-cycle"),
            }
        }

        {
            let mut baselines = self.baselines.write().await;
            for snap in &snapshots {
                if snap.stats.count > 0 {
                    baselines.insert(snap.name.clone(), Baseline::from_stats(&snap.stats));
                }
            }
        }

        for snap in &snapshots {
            if snap.samples.len() < self.config.min_points_for(&snap.name) {
                continue;
            }
            let baseline = Baseline::from_stats(&snap.stats);
            let Some(forecast) =
                self.forecaster
                    .forecast(&snap.name, &snap.samples, &baseline, Utc::now())
            else {
                continue;
            };
            if forecast.concerning {
                self.metrics.inc_anomalies_detected("predictive");
                self.submit(self.forecast_draft(snap, &baseline, &forecast)).await;
            }
        }

        let breaks = {
            let mut correlations = self.correlations.lock().await;
            correlations.analyze(&snapshots)
        };
        for brk in breaks {
            self.metrics.inc_anomalies_detected("correlation");
            self.submit(Self::break_draft(&brk)).await;
        }

        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle_at.write().await = Some(Utc::now());
        self.metrics.inc_analysis_cycles();
        self.metrics.observe_analysis_cycle(started.elapsed().as_secs_f64());

        debug!(
            series = snapshots.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis cycle complete"
        );
    }

    fn forecast_draft(
        &self,
        snap: &SeriesSnapshot,
        baseline: &Baseline,
        forecast: &Forecast,
    ) -> AlertDraft {
        let horizon_secs = self.config.forecast_horizon.as_secs();
        let detail = ContextDetail::Predictive {
            metric: snap.name.clone(),
            predicted: forecast.predicted,
            horizon_secs,
            confidence: forecast.confidence,
            baseline_mean: baseline.mean,
            baseline_std_dev: baseline.std_dev,
            trend: snap.stats.trend,
        };
        AlertDraft::new(
            AlertSeverity::Medium,
            categories::PREDICTIVE,
            format!("forecast deviation: {}", snap.name),
            format!(
                "{} is forecast to reach {:.2} within {}s, {:.1} standard deviations from its baseline mean of {:.2}",
                snap.name, forecast.predicted, horizon_secs, forecast.sigma_distance, baseline.mean
            ),
        )
        .with_source("analysis")
        .with_context(AlertContext::new(detail))
    }

    fn break_draft(brk: &CorrelationBreak) -> AlertDraft {
        let detail = ContextDetail::Correlation {
            metric_a: brk.metric_a.clone(),
            metric_b: brk.metric_b.clone(),
            expected: brk.expected,
            recent: brk.recent,
            delta: brk.delta,
            matched_points: brk.matched_points,
        };
        AlertDraft::new(
            AlertSeverity::High,
            categories::CORRELATION,
            format!("correlation break: {} / {}", brk.metric_a, brk.metric_b),
            format!(
                "{} and {} historically correlate at {:.2} but recently moved to {:.2} (delta {:.2} over {} matched points)",
                brk.metric_a, brk.metric_b, brk.expected, brk.recent, brk.delta, brk.matched_points
            ),
        )
        .with_source("analysis")
        .with_context(AlertContext::new(detail))
    }

    /// Findings never fail the cycle; a rejected draft is logged and dropped.
    async fn submit(&self, draft: AlertDraft) {
        if let Err(error) = self.alerts.create(draft).await {
            warn!(%error, "failed to raise alert from analysis cycle");
        }
    }

    /// Latest baseline per metric, as refreshed by the most recent cycle.
    pub async fn baselines(&self) -> HashMap<String, Baseline> {
        self.baselines.read().await.clone()
    }

    pub async fn baseline_for(&self, name: &str) -> Option<Baseline> {
        self.baselines.read().await.get(name).cloned()
    }

    pub async fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            baselines_tracked: self.baselines.read().await.len(),
            correlated_pairs: self.correlations.lock().await.tracked_pairs(),
            last_cycle_at: *self.last_cycle_at.read().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::ActiveFilter;
    use crate::config::MetricConfig;
    use crate::models::{MetricSample, SampleMetadata};
    use crate::series::InMemorySeriesStore;

    fn scheduler_with(
        config: EngineConfig,
    ) -> (Arc<AnalysisScheduler>, Arc<InMemorySeriesStore>, Arc<AlertManager>) {
        let series = Arc::new(InMemorySeriesStore::from_config(&config));
        let manager = Arc::new(AlertManager::with_defaults(config.clone()));
        let scheduler = Arc::new(AnalysisScheduler::new(
            config,
            series.clone(),
            manager.clone(),
        ));
        (scheduler, series, manager)
    }

    /// Record `values` at 60s spacing so the last sample lands at roughly
    /// the current instant.
    async fn record_series(store: &InMemorySeriesStore, name: &str, values: &[f64]) {
        let base = Utc::now() - chrono::Duration::seconds((values.len() as i64 - 1) * 60);
        for (i, v) in values.iter().enumerate() {
            store
                .record(MetricSample::at(
                    name,
                    *v,
                    base + chrono::Duration::seconds(i as i64 * 60),
                    SampleMetadata::new(),
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn cycle_refreshes_baselines() {
        let config = EngineConfig::default()
            .with_metric("cpu", MetricConfig::new("system", AlertSeverity::Medium));
        let (scheduler, series, _manager) = scheduler_with(config);

        record_series(&series, "cpu", &[50.0; 12]).await;
        scheduler.run_cycle().await;

        let baseline = scheduler.baseline_for("cpu").await.unwrap();
        assert_eq!(baseline.mean, 50.0);
        assert_eq!(baseline.sample_size, 12);

        let stats = scheduler.stats().await;
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.baselines_tracked, 1);
        assert!(stats.last_cycle_at.is_some());
    }

    #[tokio::test]
    async fn concerning_forecast_raises_a_medium_alert() {
        let config = EngineConfig::default()
            .with_metric("queue_depth", MetricConfig::new("system", AlertSeverity::Medium));
        let (scheduler, series, manager) = scheduler_with(config);

        // A tight, steady climb: high confidence, and the projection lands
        // past three baseline standard deviations.
        record_series(
            &series,
            "queue_depth",
            &[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0, 109.0],
        )
        .await;
        scheduler.run_cycle().await;

        let active = manager.list_active(ActiveFilter::default()).await;
        let forecast_alerts: Vec<_> = active
            .iter()
            .filter(|a| a.category == categories::PREDICTIVE)
            .collect();
        assert_eq!(forecast_alerts.len(), 1);
        assert_eq!(forecast_alerts[0].severity, AlertSeverity::Medium);
        assert!(forecast_alerts[0].title.contains("queue_depth"));
    }

    #[tokio::test]
    async fn quiet_series_raises_nothing() {
        let config = EngineConfig::default()
            .with_metric("cpu", MetricConfig::new("system", AlertSeverity::Medium));
        let (scheduler, series, manager) = scheduler_with(config);

        record_series(&series, "cpu", &[50.0; 20]).await;
        scheduler.run_cycle().await;

        assert!(manager.list_active(ActiveFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn correlation_break_raises_a_high_alert() {
        let config = EngineConfig::default()
            .with_metric("api_latency", MetricConfig::new("system", AlertSeverity::Medium))
            .with_metric("db_latency", MetricConfig::new("system", AlertSeverity::Medium));
        let (scheduler, series, manager) = scheduler_with(config);

        // Cycle 1: the pair moves together and becomes tracked.
        let a: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        let b: Vec<f64> = (0..40).map(|i| 20.0 + 2.0 * i as f64).collect();
        record_series(&series, "api_latency", &a).await;
        record_series(&series, "db_latency", &b).await;
        scheduler.run_cycle().await;
        assert_eq!(scheduler.stats().await.correlated_pairs, 1);

        // Cycle 2: db_latency turns around while api_latency keeps rising.
        let base = Utc::now();
        for i in 0..30 {
            let ts = base + chrono::Duration::seconds((i + 1) * 60);
            series
                .record(MetricSample::at(
                    "api_latency",
                    50.0 + i as f64,
                    ts,
                    SampleMetadata::new(),
                ))
                .await
                .unwrap();
            series
                .record(MetricSample::at(
                    "db_latency",
                    98.0 - 2.0 * i as f64,
                    ts,
                    SampleMetadata::new(),
                ))
                .await
                .unwrap();
        }
        scheduler.run_cycle().await;

        let active = manager.list_active(ActiveFilter::default()).await;
        let breaks: Vec<_> = active
            .iter()
            .filter(|a| a.category == categories::CORRELATION)
            .collect();
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].severity, AlertSeverity::High);
        assert!(breaks[0].title.contains("api_latency"));
        assert!(breaks[0].title.contains("db_latency"));
    }
}
