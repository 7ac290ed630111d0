//! Tier1 static analysis
//!
//! A module running inside the resource-limited runtime, with a built-in
//! heuristic used when no module can run.

pub mod abi;
pub mod heuristic;
pub mod wasm;

use crate::config::types::Result;
use crate::core::types::AnalysisRequest;
use serde::Serialize;
use std::time::Duration;

pub use heuristic::HeuristicExecutor;
pub use wasm::{FallbackExecutor, WasmTier1Executor};

/// Which engine produced a Tier1 result
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Tier1Source {
    Module { version: u32, fingerprint: String },
    Heuristic,
}

impl std::fmt::Display for Tier1Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier1Source::Module { version, fingerprint } => {
                write!(f, "module v{} ({})", version, &fingerprint[..fingerprint.len().min(12)])
            }
            Tier1Source::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Static analysis output
#[derive(Clone, Debug, Serialize)]
pub struct Tier1Result {
    /// Signature-match strength in [0, 1]
    pub pattern_score: f32,
    /// Content-model score in [0, 1]
    pub ml_score: f32,
    pub detected_pattern_count: u32,
    pub execution_time_us: u64,
    pub error_code: u32,
    /// The module ran out of wall-clock budget before this result was produced
    pub timed_out: bool,
    /// Produced by the heuristic instead of a module
    pub degraded: bool,
    pub source: Tier1Source,
    /// Names of matched signatures and header findings
    pub findings: Vec<String>,
}

impl Tier1Result {
    /// Combined Tier1 score
    ///
    /// A strong signature is decisive on its own; otherwise the two scores
    /// are blended.
    pub fn combined_score(&self, pattern_weight: f32) -> f32 {
        let w = pattern_weight.clamp(0.0, 1.0);
        let blend = w * self.pattern_score + (1.0 - w) * self.ml_score;
        self.pattern_score.max(blend).clamp(0.0, 1.0)
    }
}

/// One Tier1 strategy, chosen once by the capability probe
pub trait TierExecutor: Send + Sync {
    /// Short name for logs and capability reports
    fn name(&self) -> &'static str;

    fn execute(&self, request: &AnalysisRequest, budget: Duration) -> Result<Tier1Result>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(pattern: f32, ml: f32) -> Tier1Result {
        Tier1Result {
            pattern_score: pattern,
            ml_score: ml,
            detected_pattern_count: 0,
            execution_time_us: 0,
            error_code: 0,
            timed_out: false,
            degraded: false,
            source: Tier1Source::Heuristic,
            findings: Vec::new(),
        }
    }

    #[test]
    fn test_signature_dominates_blend() {
        assert_eq!(result(1.0, 0.0).combined_score(0.55), 1.0);
    }

    #[test]
    fn test_ml_alone_cannot_exceed_its_share() {
        let score = result(0.0, 1.0).combined_score(0.55);
        assert!((score - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_clean_input_stays_clean() {
        assert_eq!(result(0.0, 0.0).combined_score(0.55), 0.0);
    }
}
