//! Daemon plumbing for the Sentinel engine: configuration loading and the
//! HTTP control surface. The `sentineld` binary in `main.rs` wires these
//! together; the integration tests drive the same router directly.

pub mod api;
pub mod config;
