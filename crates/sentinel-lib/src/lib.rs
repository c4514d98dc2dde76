//! Core library for metric anomaly detection and alert lifecycle management
//!
//! This crate provides:
//! - Rolling per-metric series with windowed statistics
//! - Statistical and pattern-based detection on the ingest path
//! - Periodic trend forecasting and cross-metric correlation tracking
//! - Alert creation, dedup, notification fan-out, escalation, and resolution
//! - Health checks and observability

pub mod alerts;
pub mod analyze;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod series;

pub use alerts::{Alert, AlertDraft, AlertManager, AlertSeverity, AlertStatus, ChannelKind};
pub use config::{EngineConfig, MetricConfig, Sensitivity};
pub use engine::{Engine, EngineStatistics};
pub use error::EngineError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, EventLogger};
