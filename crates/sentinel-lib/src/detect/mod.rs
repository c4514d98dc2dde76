//! Synchronous per-sample detection
//!
//! Runs inside the ingest path once a series clears its minimum-sample gate:
//! - z-score scoring against the rolling statistics
//! - named behavioral patterns registered per metric
//!
//! Both are pure reads over the freshly computed statistics and the trailing
//! samples captured with the insert; they never mutate shared state.

mod patterns;
mod scorer;

pub use patterns::{PatternHit, PatternKind};
pub use scorer::{AnomalyScore, AnomalyScorer};
