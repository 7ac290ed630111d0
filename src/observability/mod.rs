//! Observability
//!
//! Structured audit events and orchestrator statistics.

pub mod audit;
pub mod metrics;

pub use metrics::{OrchestratorStats, StatsSnapshot};
