//! Engine assembly
//!
//! [`Engine`] wires the series store, the ingest-path detectors, the alert
//! manager, and the periodic analysis scheduler into one facade. Producers
//! push samples through [`Engine::record_metric`]; operators work alerts
//! through the lifecycle passthroughs; the daemon spawns the background
//! loops once and stops them over a broadcast channel.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::alerts::{
    categories, ActiveFilter, Alert, AlertContext, AlertDraft, AlertManager, AlertStatistics,
    ContextDetail, HistoryFilter, HistoryRecord, HistoryStore,
};
use crate::analyze::{AnalysisScheduler, SchedulerStats};
use crate::config::{EngineConfig, MetricConfig};
use crate::detect::AnomalyScorer;
use crate::error::EngineError;
use crate::health::{components, HealthRegistry};
use crate::models::{Baseline, MetricSample, RecordOutcome, SampleMetadata, SeriesStats};
use crate::observability::EngineMetrics;
use crate::series::{InMemorySeriesStore, SeriesRepo};

/// Aggregate view over every subsystem, for the statistics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    pub tracked_metrics: usize,
    pub alerts: AlertStatistics,
    pub analysis: SchedulerStats,
}

/// The assembled detection and alerting engine.
pub struct Engine {
    config: EngineConfig,
    series: Arc<dyn SeriesRepo>,
    alerts: Arc<AlertManager>,
    scheduler: Arc<AnalysisScheduler>,
    scorer: AnomalyScorer,
    health: HealthRegistry,
    metrics: EngineMetrics,
}

impl Engine {
    /// Default single-process assembly: in-memory series store, in-memory
    /// active table, log-line notification transports.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let series: Arc<dyn SeriesRepo> = Arc::new(InMemorySeriesStore::from_config(&config));
        let alerts = Arc::new(AlertManager::with_defaults(config.clone()));
        Ok(Self::assemble(config, series, alerts))
    }

    /// Assembly with caller-provided storage and lifecycle manager.
    pub fn with_components(
        config: EngineConfig,
        series: Arc<dyn SeriesRepo>,
        alerts: Arc<AlertManager>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::assemble(config, series, alerts))
    }

    fn assemble(
        config: EngineConfig,
        series: Arc<dyn SeriesRepo>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        let scheduler = Arc::new(AnalysisScheduler::new(
            config.clone(),
            series.clone(),
            alerts.clone(),
        ));
        Self {
            series,
            alerts,
            scheduler,
            scorer: AnomalyScorer,
            health: HealthRegistry::new(),
            metrics: EngineMetrics::new(),
            config,
        }
    }

    /// Ingest one sample: validate, store, then run synchronous detection
    /// once the series clears its minimum-sample gate. A detection finding
    /// that fails to become an alert is logged and dropped; the sample is
    /// stored either way.
    pub async fn record_metric(&self, sample: MetricSample) -> Result<RecordOutcome, EngineError> {
        if !sample.value.is_finite() {
            self.metrics.inc_samples_rejected();
            return Err(EngineError::Validation(format!(
                "sample for '{}' must be finite, got {}",
                sample.name, sample.value
            )));
        }
        let Some(metric) = self.config.metric(&sample.name).cloned() else {
            self.metrics.inc_samples_rejected();
            return Err(EngineError::UnknownMetric(sample.name.clone()));
        };

        let name = sample.name.clone();
        let value = sample.value;
        let outcome = self.series.record(sample).await?;
        self.metrics.inc_samples_ingested();

        if outcome.ready {
            self.detect(&name, value, &metric, &outcome).await;
        }
        Ok(outcome)
    }

    /// [`Engine::record_metric`] with a now-stamped sample and no metadata.
    pub async fn record_value(
        &self,
        name: impl Into<String>,
        value: f64,
    ) -> Result<RecordOutcome, EngineError> {
        self.record_metric(MetricSample::new(name, value, SampleMetadata::new()))
            .await
    }

    async fn detect(
        &self,
        name: &str,
        value: f64,
        metric: &MetricConfig,
        outcome: &RecordOutcome,
    ) {
        let stats = &outcome.stats;

        let score = self.scorer.evaluate(value, stats, metric.sensitivity);
        if score.is_anomaly {
            self.metrics.inc_anomalies_detected("statistical");
            let draft = AlertDraft::new(
                metric.severity,
                metric.category.clone(),
                format!("statistical anomaly: {name}"),
                format!(
                    "{name} at {value:.2} is {:.1} standard deviations from its rolling mean of {:.2} (threshold {:.1})",
                    score.score, stats.mean, score.threshold
                ),
            )
            .with_source("detector")
            .with_context(AlertContext::new(ContextDetail::MetricAnomaly {
                metric: name.to_string(),
                observed: value,
                threshold: score.threshold,
                score: score.score,
                mean: stats.mean,
                std_dev: stats.std_dev,
                trend: stats.trend,
            }));
            self.submit(draft).await;
        }

        if metric.patterns.is_empty() {
            return;
        }
        let Some(sample) = outcome.recent.last() else {
            return;
        };
        for pattern in &metric.patterns {
            let Some(hit) = pattern.evaluate(sample, stats, &outcome.recent) else {
                continue;
            };
            self.metrics.inc_anomalies_detected(pattern.id());
            let draft = AlertDraft::new(
                hit.severity,
                categories::PATTERN_DETECTION,
                format!("{}: {name}", hit.pattern),
                hit.description.clone(),
            )
            .with_source("detector")
            .with_context(AlertContext::new(ContextDetail::Pattern {
                metric: name.to_string(),
                pattern: hit.pattern.id().to_string(),
                observed: value,
                data: hit.data.clone(),
            }));
            self.submit(draft).await;
        }
    }

    async fn submit(&self, draft: AlertDraft) {
        if let Err(error) = self.alerts.create(draft).await {
            warn!(%error, "failed to raise alert from ingest detection");
        }
    }

    /// Raise an alert directly, bypassing detection. Subject to the same
    /// dedup and policy rules as detector alerts.
    pub async fn raise_alert(&self, draft: AlertDraft) -> Result<Option<Alert>, EngineError> {
        self.alerts.create(draft).await
    }

    pub async fn acknowledge_alert(&self, id: &str, by: &str) -> Result<Alert, EngineError> {
        self.alerts.acknowledge(id, by).await
    }

    pub async fn resolve_alert(
        &self,
        id: &str,
        by: &str,
        note: Option<String>,
    ) -> Result<Alert, EngineError> {
        self.alerts.resolve(id, by, note).await
    }

    pub async fn active_alerts(&self, filter: ActiveFilter) -> Vec<Alert> {
        self.alerts.list_active(filter).await
    }

    pub async fn alert_history(&self, filter: &HistoryFilter) -> Vec<HistoryRecord> {
        self.alerts.history().query(filter).await
    }

    pub async fn metric_stats(&self, name: &str) -> Result<SeriesStats, EngineError> {
        self.series.stats(name).await
    }

    /// Baseline refreshed by the most recent analysis cycle, if any.
    pub async fn baseline_for(&self, name: &str) -> Option<Baseline> {
        self.scheduler.baseline_for(name).await
    }

    /// One immediate analysis pass outside the scheduled cadence.
    pub async fn run_analysis_cycle(&self) {
        self.scheduler.run_cycle().await;
    }

    pub async fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            tracked_metrics: self.config.metrics.len(),
            alerts: self.alerts.statistics().await,
            analysis: self.scheduler.stats().await,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    /// Load persisted history into the log, typically at daemon start.
    pub async fn load_history(&self, store: &dyn HistoryStore) -> Result<usize, EngineError> {
        self.alerts.history().load_from(store).await
    }

    /// Spawn the analysis loop and the cleanup loop. Both stop on the
    /// broadcast; when a store is provided, history is persisted on every
    /// cleanup pass and once more on the way out.
    pub async fn spawn_background(
        self: &Arc<Self>,
        history_store: Option<Arc<dyn HistoryStore>>,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        for component in [
            components::INGEST,
            components::ANALYSIS,
            components::DISPATCH,
            components::HISTORY,
        ] {
            self.health.register(component).await;
        }

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(self.scheduler.clone().run(shutdown.subscribe())));

        let engine = Arc::clone(self);
        let mut rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(engine.config.cleanup_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.run_cleanup(history_store.as_deref()).await;
                    }
                    _ = rx.recv() => {
                        if let Some(store) = history_store.as_deref() {
                            engine.persist_history(store).await;
                        }
                        info!("shutting down cleanup loop");
                        break;
                    }
                }
            }
        }));

        self.health.set_ready(true).await;
        tasks
    }

    /// Stop per-alert timers and mark the engine not ready. The background
    /// loops stop via the broadcast channel they were spawned with.
    pub async fn shutdown(&self) {
        self.health.set_ready(false).await;
        self.alerts.shutdown().await;
    }

    async fn run_cleanup(&self, history_store: Option<&dyn HistoryStore>) {
        let evicted = self.series.trim_expired().await;
        let dropped = self.alerts.history().trim_expired().await;
        if let Some(store) = history_store {
            self.persist_history(store).await;
        }
        debug!(evicted, dropped, "cleanup pass complete");
    }

    async fn persist_history(&self, store: &dyn HistoryStore) {
        match self.alerts.history().save_to(store).await {
            Ok(()) => self.health.set_healthy(components::HISTORY).await,
            Err(error) => {
                warn!(%error, "failed to persist alert history");
                self.health
                    .set_degraded(components::HISTORY, error.to_string())
                    .await;
            }
        }
    }
}
