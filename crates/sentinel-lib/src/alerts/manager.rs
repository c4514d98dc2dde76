//! Alert lifecycle management
//!
//! The manager owns every active alert from creation to resolution. Creation
//! runs dedup against recent same-category, same-title alerts, snapshots the
//! severity policy, notifies the policy channels, and arms a timer that
//! escalates unacknowledged alerts through the ladder or auto-resolves them
//! when the policy allows it. Acknowledgment and resolution are operator
//! actions; resolution moves the alert out of the active table and into the
//! history log.
//!
//! All state transitions serialize on one mutex, so a dedup check, an
//! escalation tick, and an operator resolve can never interleave on the same
//! alert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::observability::{EngineMetrics, EventLogger};

use super::dispatch::{AlertNotice, NotificationDispatcher};
use super::history::{AlertHistory, HistoryEvent};
use super::{Alert, AlertDraft, AlertSeverity, AlertStatus, ChannelKind, NotificationAttempt};

/// Resolver recorded on alerts the engine resolves without an operator.
pub const SYSTEM_RESOLVER: &str = "system";

/// Resolution note stamped on auto-resolved alerts.
pub const AUTO_RESOLUTION_NOTE: &str =
    "auto-resolved: no operator action within the policy window";

/// Channels a resolution notice goes to, whatever the alert's own policy.
const RESOLUTION_CHANNELS: [ChannelKind; 2] = [ChannelKind::Email, ChannelKind::Dashboard];

/// Storage seam for the active-alert table.
#[async_trait]
pub trait ActiveAlertRepo: Send + Sync {
    async fn insert(&self, alert: Alert);
    async fn get(&self, id: &str) -> Option<Alert>;
    async fn update(&self, alert: Alert);
    async fn remove(&self, id: &str) -> Option<Alert>;
    async fn list(&self) -> Vec<Alert>;
    async fn count(&self) -> usize;
}

/// In-process active table; the default for single-node deployments.
#[derive(Default)]
pub struct InMemoryAlertRepo {
    alerts: RwLock<HashMap<String, Alert>>,
}

impl InMemoryAlertRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActiveAlertRepo for InMemoryAlertRepo {
    async fn insert(&self, alert: Alert) {
        self.alerts.write().await.insert(alert.id.clone(), alert);
    }

    async fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.read().await.get(id).cloned()
    }

    async fn update(&self, alert: Alert) {
        self.alerts.write().await.insert(alert.id.clone(), alert);
    }

    async fn remove(&self, id: &str) -> Option<Alert> {
        self.alerts.write().await.remove(id)
    }

    async fn list(&self) -> Vec<Alert> {
        self.alerts.read().await.values().cloned().collect()
    }

    async fn count(&self) -> usize {
        self.alerts.read().await.len()
    }
}

/// Filter for listing active alerts. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ActiveFilter {
    pub category: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub acknowledged: Option<bool>,
}

/// Lifetime counters plus the current active breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStatistics {
    pub active_total: usize,
    pub active_unacknowledged: usize,
    pub active_by_severity: HashMap<AlertSeverity, usize>,
    pub active_by_category: HashMap<String, usize>,
    pub created_total: u64,
    pub deduplicated_total: u64,
    pub resolved_total: u64,
    pub auto_resolved_total: u64,
    pub resolved_last_24h: usize,
    pub escalations_total: u64,
    pub notifications_sent_total: u64,
    pub notifications_failed_total: u64,
    pub history_records: usize,
}

/// Same-category, same-title alerts within the dedup window are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    category: String,
    title: String,
}

/// Drives alerts through creation, notification, escalation, and resolution.
pub struct AlertManager {
    config: EngineConfig,
    repo: Arc<dyn ActiveAlertRepo>,
    dispatcher: NotificationDispatcher,
    history: Arc<AlertHistory>,
    dedup_window: chrono::Duration,
    /// Serializes lifecycle transitions and holds the dedup table. Entries
    /// outlive resolution: a duplicate arriving just after its original
    /// resolved is still suppressed until the window passes.
    transitions: Mutex<HashMap<DedupKey, (String, DateTime<Utc>)>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    created: AtomicU64,
    deduplicated: AtomicU64,
    resolved: AtomicU64,
    auto_resolved: AtomicU64,
    escalations: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    metrics: EngineMetrics,
    events: EventLogger,
}

impl AlertManager {
    pub fn new(
        config: EngineConfig,
        repo: Arc<dyn ActiveAlertRepo>,
        dispatcher: NotificationDispatcher,
        history: Arc<AlertHistory>,
    ) -> Self {
        let dedup_window =
            chrono::Duration::milliseconds(config.dedup_window.as_millis() as i64);
        Self {
            repo,
            dispatcher,
            history,
            dedup_window,
            transitions: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            auto_resolved: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            metrics: EngineMetrics::new(),
            events: EventLogger::new(),
            config,
        }
    }

    /// Manager with an in-memory active table, log-line notification
    /// transports, and an in-memory history log.
    pub fn with_defaults(config: EngineConfig) -> Self {
        let repo = Arc::new(InMemoryAlertRepo::new());
        let dispatcher = NotificationDispatcher::log_only(config.enabled_channels.clone());
        let history = Arc::new(AlertHistory::new(config.history_retention));
        Self::new(config, repo, dispatcher, history)
    }

    pub fn history(&self) -> &Arc<AlertHistory> {
        &self.history
    }

    /// Create an alert from a draft.
    ///
    /// Returns `Ok(None)` when an alert with the same category and title was
    /// created within the dedup window; the duplicate is counted and dropped
    /// without notifying anyone. On success the returned alert is the state
    /// at creation; notification attempts land on the stored copy as
    /// deliveries settle.
    pub async fn create(
        self: &Arc<Self>,
        draft: AlertDraft,
    ) -> Result<Option<Alert>, EngineError> {
        if draft.title.trim().is_empty() {
            return Err(EngineError::Validation(
                "alert title must not be empty".to_string(),
            ));
        }
        if draft.category.trim().is_empty() {
            return Err(EngineError::Validation(
                "alert category must not be empty".to_string(),
            ));
        }
        let policy = self.config.policy(draft.severity).cloned().ok_or_else(|| {
            EngineError::Configuration(format!(
                "no alert policy configured for severity {}",
                draft.severity
            ))
        })?;

        let now = Utc::now();
        let key = DedupKey {
            category: draft.category.clone(),
            title: draft.title.clone(),
        };
        let alert = {
            let mut transitions = self.transitions.lock().await;
            transitions.retain(|_, (_, at)| now - *at < self.dedup_window);
            if let Some((existing_id, _)) = transitions.get(&key) {
                self.deduplicated.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_alerts_deduplicated();
                self.events
                    .alert_deduplicated(&draft.category, &draft.title, existing_id);
                return Ok(None);
            }
            let alert = Alert::from_draft(draft, policy, now);
            transitions.insert(key, (alert.id.clone(), now));
            self.repo.insert(alert.clone()).await;
            alert
        };

        self.created.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_alerts_created(alert.severity.as_str());
        self.metrics.set_active_alerts(self.repo.count().await as i64);
        self.events.alert_created(&alert);
        self.history
            .append(HistoryEvent::Created, alert.clone())
            .await;

        let notice = AlertNotice::created(&alert);
        let attempts = self.dispatcher.dispatch(&notice, &alert.policy.channels).await;
        self.record_attempts(&alert.id, attempts).await;

        self.arm_lifecycle_timer(&alert).await;
        Ok(Some(alert))
    }

    /// Mark an alert acknowledged, which stops escalation and auto-resolve.
    pub async fn acknowledge(&self, id: &str, by: &str) -> Result<Alert, EngineError> {
        if by.trim().is_empty() {
            return Err(EngineError::Validation(
                "acknowledger must not be empty".to_string(),
            ));
        }
        let alert = {
            let _transitions = self.transitions.lock().await;
            let Some(mut alert) = self.repo.get(id).await else {
                if self.history.contains_resolved(id).await {
                    return Err(EngineError::AlreadyResolved(id.to_string()));
                }
                return Err(EngineError::NotFound(id.to_string()));
            };
            if alert.acknowledged {
                return Err(EngineError::AlreadyAcknowledged(id.to_string()));
            }
            alert.acknowledged = true;
            alert.acknowledged_by = Some(by.to_string());
            alert.acknowledged_at = Some(Utc::now());
            self.repo.update(alert.clone()).await;
            alert
        };

        self.events.alert_acknowledged(&alert, by);
        self.history
            .append(HistoryEvent::Acknowledged, alert.clone())
            .await;
        Ok(alert)
    }

    /// Resolve an alert: remove it from the active table, append it to
    /// history, and send a resolution notice.
    pub async fn resolve(
        &self,
        id: &str,
        by: &str,
        note: Option<String>,
    ) -> Result<Alert, EngineError> {
        if by.trim().is_empty() {
            return Err(EngineError::Validation(
                "resolver must not be empty".to_string(),
            ));
        }
        self.resolve_internal(id, by, note, false).await
    }

    pub async fn get(&self, id: &str) -> Option<Alert> {
        self.repo.get(id).await
    }

    /// Active alerts matching the filter, most urgent severity first and
    /// newest first within a severity.
    pub async fn list_active(&self, filter: ActiveFilter) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .repo
            .list()
            .await
            .into_iter()
            .filter(|a| {
                filter
                    .category
                    .as_deref()
                    .map_or(true, |c| a.category == c)
                    && filter.severity.map_or(true, |s| a.severity == s)
                    && filter.acknowledged.map_or(true, |v| a.acknowledged == v)
            })
            .collect();
        alerts.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then(b.created_at.cmp(&a.created_at))
        });
        alerts
    }

    pub async fn statistics(&self) -> AlertStatistics {
        let active = self.repo.list().await;
        let mut active_by_severity: HashMap<AlertSeverity, usize> = HashMap::new();
        let mut active_by_category: HashMap<String, usize> = HashMap::new();
        let mut active_unacknowledged = 0;
        for alert in &active {
            *active_by_severity.entry(alert.severity).or_insert(0) += 1;
            *active_by_category.entry(alert.category.clone()).or_insert(0) += 1;
            if !alert.acknowledged {
                active_unacknowledged += 1;
            }
        }
        let day_ago = Utc::now() - chrono::Duration::hours(24);
        AlertStatistics {
            active_total: active.len(),
            active_unacknowledged,
            active_by_severity,
            active_by_category,
            created_total: self.created.load(Ordering::Relaxed),
            deduplicated_total: self.deduplicated.load(Ordering::Relaxed),
            resolved_total: self.resolved.load(Ordering::Relaxed),
            auto_resolved_total: self.auto_resolved.load(Ordering::Relaxed),
            resolved_last_24h: self.history.resolved_since(day_ago).await,
            escalations_total: self.escalations.load(Ordering::Relaxed),
            notifications_sent_total: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed_total: self.notifications_failed.load(Ordering::Relaxed),
            history_records: self.history.len().await,
        }
    }

    /// Abort every pending escalation and auto-resolve timer.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// Spawn the per-alert timer that escalates or auto-resolves. Policies
    /// that neither escalate nor auto-resolve get no timer.
    async fn arm_lifecycle_timer(self: &Arc<Self>, alert: &Alert) {
        let escalates =
            alert.policy.require_acknowledgment && !self.config.escalation_levels.is_empty();
        let auto_resolve = alert.policy.auto_resolve;
        if !escalates && !auto_resolve {
            return;
        }
        let manager = Arc::clone(self);
        let id = alert.id.clone();
        let tick = alert.policy.escalation_time;
        let handle = tokio::spawn(async move {
            let mut ticks: u32 = 0;
            loop {
                tokio::time::sleep(tick).await;
                ticks += 1;
                // Auto-resolve fires at twice the escalation time.
                if auto_resolve && ticks >= 2 {
                    manager.auto_resolve(&id).await;
                    break;
                }
                if escalates {
                    if !manager.escalate_if_unacknowledged(&id).await {
                        break;
                    }
                } else if !manager.is_active_unacknowledged(&id).await {
                    break;
                }
            }
        });
        self.timers.lock().await.insert(alert.id.clone(), handle);
    }

    /// One escalation tick. Bumps the alert to the next ladder tier (clamped
    /// at the top, which keeps re-notifying that tier) and sends the
    /// forced-critical escalation notice. Returns false once the alert no
    /// longer needs the timer.
    async fn escalate_if_unacknowledged(&self, id: &str) -> bool {
        let (alert, level) = {
            let _transitions = self.transitions.lock().await;
            let Some(mut alert) = self.repo.get(id).await else {
                return false;
            };
            if alert.acknowledged || alert.is_resolved() {
                return false;
            }
            let ladder = &self.config.escalation_levels;
            if ladder.is_empty() {
                return false;
            }
            let next = (alert.escalation_level + 1).min(ladder.len() as u32);
            alert.escalation_level = next;
            let level = ladder[(next - 1) as usize].clone();
            self.repo.update(alert.clone()).await;
            (alert, level)
        };

        self.escalations.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_alert_escalations();
        self.events
            .alert_escalated(&alert, level.level, &level.contacts);

        let notice = AlertNotice::escalated(&alert, &level);
        let attempts = self.dispatcher.dispatch(&notice, &level.channels).await;
        self.record_attempts(&alert.id, attempts).await;
        true
    }

    async fn auto_resolve(&self, id: &str) {
        let note = Some(AUTO_RESOLUTION_NOTE.to_string());
        if let Err(error) = self.resolve_internal(id, SYSTEM_RESOLVER, note, true).await {
            debug!(alert_id = %id, %error, "auto-resolution skipped");
        }
    }

    async fn is_active_unacknowledged(&self, id: &str) -> bool {
        match self.repo.get(id).await {
            Some(alert) => !alert.acknowledged && !alert.is_resolved(),
            None => false,
        }
    }

    /// The one resolution path, shared by operators and the auto-resolve
    /// timer. The automatic flavor refuses acknowledged alerts; an operator
    /// resolve does not.
    async fn resolve_internal(
        &self,
        id: &str,
        by: &str,
        note: Option<String>,
        automatic: bool,
    ) -> Result<Alert, EngineError> {
        let alert = {
            let _transitions = self.transitions.lock().await;
            let Some(mut alert) = self.repo.get(id).await else {
                if self.history.contains_resolved(id).await {
                    return Err(EngineError::AlreadyResolved(id.to_string()));
                }
                return Err(EngineError::NotFound(id.to_string()));
            };
            if automatic && alert.acknowledged {
                return Err(EngineError::AlreadyAcknowledged(id.to_string()));
            }
            alert.status = AlertStatus::Resolved;
            alert.resolved_by = Some(by.to_string());
            alert.resolved_at = Some(Utc::now());
            alert.resolution = note;
            self.repo.remove(id).await;
            alert
        };

        self.resolved.fetch_add(1, Ordering::Relaxed);
        if automatic {
            self.auto_resolved.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.inc_alerts_resolved();
        self.metrics.set_active_alerts(self.repo.count().await as i64);
        self.events.alert_resolved(&alert, by, automatic);
        self.history
            .append(HistoryEvent::Resolved, alert.clone())
            .await;

        let notice = AlertNotice::resolved(&alert, by);
        let attempts = self.dispatcher.dispatch(&notice, &RESOLUTION_CHANNELS).await;
        let sent = attempts.iter().filter(|a| a.success).count() as u64;
        self.notifications_sent.fetch_add(sent, Ordering::Relaxed);
        self.notifications_failed
            .fetch_add(attempts.len() as u64 - sent, Ordering::Relaxed);

        self.cancel_timer(&alert.id).await;
        Ok(alert)
    }

    /// Merge delivery attempts into the stored alert. Works on the current
    /// copy under the transitions lock; a concurrent acknowledgment must not
    /// be lost.
    async fn record_attempts(&self, id: &str, attempts: Vec<NotificationAttempt>) {
        if attempts.is_empty() {
            return;
        }
        let sent = attempts.iter().filter(|a| a.success).count() as u64;
        self.notifications_sent.fetch_add(sent, Ordering::Relaxed);
        self.notifications_failed
            .fetch_add(attempts.len() as u64 - sent, Ordering::Relaxed);

        let _transitions = self.transitions.lock().await;
        match self.repo.get(id).await {
            Some(mut alert) => {
                alert.notifications_sent += sent as u32;
                alert.attempts.extend(attempts);
                self.repo.update(alert).await;
            }
            None => debug!(alert_id = %id, "alert resolved before delivery bookkeeping"),
        }
    }

    async fn cancel_timer(&self, id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(id) {
            handle.abort();
        }
    }
}
