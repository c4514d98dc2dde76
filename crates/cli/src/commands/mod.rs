//! CLI command implementations

pub mod alerts;
pub mod debug;
pub mod status;
