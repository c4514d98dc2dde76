//! Alert history log
//!
//! Append-only record of lifecycle transitions, capped by a retention
//! horizon. Resolution moves an alert out of the active table, so history is
//! the only place a resolved alert can still be found. Persistence goes
//! through [`HistoryStore`]; the bundled store writes one JSON file
//! atomically via a temp-file rename.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::EngineError;

use super::{Alert, AlertSeverity};

/// Lifecycle transition kinds recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEvent {
    Created,
    Acknowledged,
    Resolved,
}

/// One transition, with the full alert state after it was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub at: DateTime<Utc>,
    pub event: HistoryEvent,
    pub alert: Alert,
}

/// Filter for history queries. Conditions are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub category: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub limit: Option<usize>,
}

/// Persistence seam for the history log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self) -> Result<Vec<HistoryRecord>, EngineError>;
    async fn save(&self, records: &[HistoryRecord]) -> Result<(), EngineError>;
}

/// In-memory history log shared by the manager and the API layer.
pub struct AlertHistory {
    retention: chrono::Duration,
    records: RwLock<Vec<HistoryRecord>>,
}

impl AlertHistory {
    pub fn new(retention: std::time::Duration) -> Self {
        Self {
            retention: chrono::Duration::milliseconds(retention.as_millis() as i64),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Append one transition, stamped with the current time.
    pub async fn append(&self, event: HistoryEvent, alert: Alert) {
        let mut records = self.records.write().await;
        records.push(HistoryRecord {
            at: Utc::now(),
            event,
            alert,
        });
    }

    /// Records matching the filter, newest first.
    pub async fn query(&self, filter: &HistoryFilter) -> Vec<HistoryRecord> {
        let records = self.records.read().await;
        let mut out: Vec<HistoryRecord> = records
            .iter()
            .filter(|r| {
                filter
                    .category
                    .as_deref()
                    .map_or(true, |c| r.alert.category == c)
            })
            .filter(|r| filter.severity.map_or(true, |s| r.alert.severity == s))
            .cloned()
            .collect();
        out.reverse();
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }

    /// Whether this alert id reached resolution at some point in the log.
    pub async fn contains_resolved(&self, id: &str) -> bool {
        self.records
            .read()
            .await
            .iter()
            .any(|r| r.event == HistoryEvent::Resolved && r.alert.id == id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Drop records past the retention horizon. Returns the dropped count.
    pub async fn trim_expired(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.at >= cutoff);
        before - records.len()
    }

    pub async fn snapshot(&self) -> Vec<HistoryRecord> {
        self.records.read().await.clone()
    }

    /// Resolutions recorded at or after the cutoff.
    pub async fn resolved_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.event == HistoryEvent::Resolved && r.at >= cutoff)
            .count()
    }

    /// Replace the in-memory log with the store's contents, dropping records
    /// already past the retention horizon. Returns how many survived.
    pub async fn load_from(&self, store: &dyn HistoryStore) -> Result<usize, EngineError> {
        let cutoff = Utc::now() - self.retention;
        let mut loaded = store.load().await?;
        loaded.retain(|r| r.at >= cutoff);
        let count = loaded.len();
        *self.records.write().await = loaded;
        Ok(count)
    }

    pub async fn save_to(&self, store: &dyn HistoryStore) -> Result<(), EngineError> {
        let records = self.records.read().await;
        store.save(&records).await
    }
}

/// History persistence as a single JSON file, written atomically.
pub struct JsonFileHistoryStore {
    path: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryRecord>, EngineError> {
        // A store that has never been written to is an empty log.
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read(&self.path).await?;
        let records = serde_json::from_slice(&data)?;
        Ok(records)
    }

    async fn save(&self, records: &[HistoryRecord]) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(records)?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertDraft;
    use crate::config::EngineConfig;
    use std::time::Duration;

    fn test_alert(severity: AlertSeverity, category: &str, title: &str) -> Alert {
        let policy = EngineConfig::default().policy(severity).unwrap().clone();
        Alert::from_draft(
            AlertDraft::new(severity, category, title, "test alert"),
            policy,
            Utc::now(),
        )
    }

    fn history() -> AlertHistory {
        AlertHistory::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn query_is_newest_first_and_respects_the_limit() {
        let history = history();
        for i in 0..5 {
            history
                .append(
                    HistoryEvent::Created,
                    test_alert(AlertSeverity::Low, "system", &format!("alert-{i}")),
                )
                .await;
        }

        let all = history.query(&HistoryFilter::default()).await;
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].alert.title, "alert-4");
        assert_eq!(all[4].alert.title, "alert-0");

        let limited = history
            .query(&HistoryFilter {
                limit: Some(2),
                ..Default::default()
            })
            .await;
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].alert.title, "alert-4");
    }

    #[tokio::test]
    async fn filters_are_conjunctive() {
        let history = history();
        history
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::High, "trading", "pnl drop"),
            )
            .await;
        history
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::High, "security", "login spike"),
            )
            .await;
        history
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::Low, "trading", "minor wobble"),
            )
            .await;

        let trading_high = history
            .query(&HistoryFilter {
                category: Some("trading".to_string()),
                severity: Some(AlertSeverity::High),
                limit: None,
            })
            .await;
        assert_eq!(trading_high.len(), 1);
        assert_eq!(trading_high[0].alert.title, "pnl drop");
    }

    #[tokio::test]
    async fn resolution_lookups_only_match_resolved_events() {
        let history = history();
        let created = test_alert(AlertSeverity::Medium, "system", "still open");
        let mut resolved = test_alert(AlertSeverity::Medium, "system", "closed");
        resolved.status = crate::alerts::AlertStatus::Resolved;
        let resolved_id = resolved.id.clone();
        let created_id = created.id.clone();

        history.append(HistoryEvent::Created, created).await;
        history.append(HistoryEvent::Resolved, resolved).await;

        assert!(history.contains_resolved(&resolved_id).await);
        assert!(!history.contains_resolved(&created_id).await);
        assert!(!history.contains_resolved("no-such-id").await);
    }

    #[tokio::test]
    async fn trim_drops_only_expired_records() {
        let history = AlertHistory::new(Duration::from_millis(50));
        history
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::Low, "system", "old"),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        history
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::Low, "system", "fresh"),
            )
            .await;

        assert_eq!(history.trim_expired().await, 1);
        let remaining = history.query(&HistoryFilter::default()).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].alert.title, "fresh");
    }

    #[tokio::test]
    async fn file_store_round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistoryStore::new(dir.path().join("history.json"));

        let history = history();
        history
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::Critical, "trading", "loss streak"),
            )
            .await;
        history
            .append(
                HistoryEvent::Resolved,
                test_alert(AlertSeverity::Critical, "trading", "loss streak"),
            )
            .await;
        history.save_to(&store).await.unwrap();

        let restored = AlertHistory::new(Duration::from_secs(3600));
        let loaded = restored.load_from(&store).await.unwrap();
        assert_eq!(loaded, 2);

        let records = restored.query(&HistoryFilter::default()).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, HistoryEvent::Resolved);
        assert_eq!(records[0].alert.category, "trading");
    }

    #[tokio::test]
    async fn loading_a_missing_file_yields_an_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistoryStore::new(dir.path().join("never-written.json"));

        let history = history();
        assert_eq!(history.load_from(&store).await.unwrap(), 0);
        assert_eq!(history.len().await, 0);
    }

    #[tokio::test]
    async fn load_drops_records_past_the_retention_horizon() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistoryStore::new(dir.path().join("history.json"));

        let writer = history();
        writer
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::Low, "system", "stale"),
            )
            .await;
        writer.save_to(&store).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        let reader = AlertHistory::new(Duration::from_millis(50));
        assert_eq!(reader.load_from(&store).await.unwrap(), 0);
        assert_eq!(reader.len().await, 0);
    }

    #[tokio::test]
    async fn resolved_counts_respect_the_cutoff() {
        let history = history();
        let mut resolved = test_alert(AlertSeverity::High, "system", "closed");
        resolved.status = crate::alerts::AlertStatus::Resolved;
        history
            .append(
                HistoryEvent::Created,
                test_alert(AlertSeverity::High, "system", "open"),
            )
            .await;
        history.append(HistoryEvent::Resolved, resolved).await;

        let hour = chrono::Duration::hours(1);
        assert_eq!(history.resolved_since(Utc::now() - hour).await, 1);
        assert_eq!(history.resolved_since(Utc::now() + hour).await, 0);
    }
}
