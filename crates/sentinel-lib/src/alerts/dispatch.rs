//! Notification fan-out
//!
//! The dispatcher renders one notice per lifecycle event and delivers it to
//! every requested channel concurrently. Delivery is all-settled: every
//! channel gets its attempt regardless of how the others fare, and the
//! attempt outcomes flow back to the manager for the alert's audit trail.
//!
//! Channels are transports behind the [`NotificationChannel`] seam. The
//! bundled [`LogChannel`] emits structured log lines, which stands in for
//! email, SMS, webhook, and dashboard transports in single-process
//! deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::config::EscalationLevel;
use crate::error::ChannelDeliveryError;
use crate::observability::{EngineMetrics, EventLogger};

use super::{Alert, AlertSeverity, ChannelKind, NotificationAttempt};

/// Which lifecycle event a notice announces.
#[derive(Debug, Clone, PartialEq)]
pub enum NoticeEvent {
    Created,
    Escalated { level: u32, contacts: Vec<String> },
    Resolved { by: String },
}

/// A rendered notification, ready for any channel to deliver.
#[derive(Debug, Clone)]
pub struct AlertNotice {
    pub alert_id: String,
    /// Severity the notice is rendered at. Escalation notices are always
    /// rendered critical, whatever the alert's own severity.
    pub severity: AlertSeverity,
    pub category: String,
    pub title: String,
    pub body: String,
    pub event: NoticeEvent,
}

impl AlertNotice {
    pub fn created(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id.clone(),
            severity: alert.severity,
            category: alert.category.clone(),
            title: alert.title.clone(),
            body: format!(
                "[{}] {}: {} (priority {})",
                alert.severity, alert.title, alert.description, alert.policy.priority
            ),
            event: NoticeEvent::Created,
        }
    }

    pub fn escalated(alert: &Alert, level: &EscalationLevel) -> Self {
        let respond_mins = level.delay.as_secs() / 60;
        Self {
            alert_id: alert.id.clone(),
            severity: AlertSeverity::Critical,
            category: alert.category.clone(),
            title: alert.title.clone(),
            body: format!(
                "[ESCALATION L{}] {}: unacknowledged {} alert, paging {} (respond within {}m)",
                level.level,
                alert.title,
                alert.severity,
                level.contacts.join(", "),
                respond_mins
            ),
            event: NoticeEvent::Escalated {
                level: level.level,
                contacts: level.contacts.clone(),
            },
        }
    }

    pub fn resolved(alert: &Alert, by: &str) -> Self {
        let note = alert
            .resolution
            .as_deref()
            .map(|r| format!(": {r}"))
            .unwrap_or_default();
        Self {
            alert_id: alert.id.clone(),
            severity: alert.severity,
            category: alert.category.clone(),
            title: alert.title.clone(),
            body: format!("[RESOLVED] {} resolved by {}{}", alert.title, by, note),
            event: NoticeEvent::Resolved { by: by.to_string() },
        }
    }
}

/// One delivery transport.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;
    async fn deliver(&self, notice: &AlertNotice) -> Result<(), ChannelDeliveryError>;
}

/// Transport that writes notices as structured log lines.
pub struct LogChannel {
    kind: ChannelKind,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, notice: &AlertNotice) -> Result<(), ChannelDeliveryError> {
        info!(
            event = "notification",
            channel = %self.kind,
            alert_id = %notice.alert_id,
            severity = %notice.severity,
            category = %notice.category,
            "{}",
            notice.body
        );
        Ok(())
    }
}

/// Transports keyed by the channel kind they serve.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a log transport on every channel kind.
    pub fn with_log_channels() -> Self {
        let mut registry = Self::new();
        for kind in ChannelKind::all() {
            registry.register(Arc::new(LogChannel::new(kind)));
        }
        registry
    }

    /// Register a transport under its own kind, replacing any previous one.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.insert(channel.kind(), channel);
    }

    fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn NotificationChannel>> {
        self.channels.get(&kind)
    }
}

/// Fans notices out to channels and records the outcome of every attempt.
pub struct NotificationDispatcher {
    registry: ChannelRegistry,
    enabled: HashSet<ChannelKind>,
    metrics: EngineMetrics,
    events: EventLogger,
}

impl NotificationDispatcher {
    pub fn new(registry: ChannelRegistry, enabled: HashSet<ChannelKind>) -> Self {
        Self {
            registry,
            enabled,
            metrics: EngineMetrics::new(),
            events: EventLogger::new(),
        }
    }

    /// Dispatcher that logs every notice, for single-process deployments and
    /// tests.
    pub fn log_only(enabled: HashSet<ChannelKind>) -> Self {
        Self::new(ChannelRegistry::with_log_channels(), enabled)
    }

    /// Deliver a notice on every requested channel concurrently and wait for
    /// all of them. Disabled or unregistered channels are skipped without an
    /// attempt; failures come back as failed attempts.
    pub async fn dispatch(
        &self,
        notice: &AlertNotice,
        channels: &[ChannelKind],
    ) -> Vec<NotificationAttempt> {
        let mut deliveries = Vec::new();
        for &kind in channels {
            if !self.enabled.contains(&kind) {
                debug!(channel = %kind, alert_id = %notice.alert_id, "channel disabled, skipping");
                continue;
            }
            let Some(channel) = self.registry.get(kind) else {
                debug!(channel = %kind, alert_id = %notice.alert_id, "no transport registered, skipping");
                continue;
            };
            let channel = Arc::clone(channel);
            let notice = notice.clone();
            deliveries.push((
                kind,
                tokio::spawn(async move { channel.deliver(&notice).await }),
            ));
        }

        let mut attempts = Vec::with_capacity(deliveries.len());
        for (kind, handle) in deliveries {
            let attempt = match handle.await {
                Ok(Ok(())) => NotificationAttempt::success(kind, Utc::now()),
                Ok(Err(error)) => {
                    self.events
                        .notification_failed(&notice.alert_id, kind, &error.to_string());
                    NotificationAttempt::failure(kind, Utc::now(), error.to_string())
                }
                Err(join_error) => {
                    let message = format!("delivery task failed: {join_error}");
                    self.events
                        .notification_failed(&notice.alert_id, kind, &message);
                    NotificationAttempt::failure(kind, Utc::now(), message)
                }
            };
            self.metrics.inc_notification(kind, attempt.success);
            attempts.push(attempt);
        }
        attempts
    }
}
