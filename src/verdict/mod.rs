//! Behavioral scoring and verdict derivation
//!
//! Folds Tier2 traces into metrics and fuses tier signals into verdicts.

pub mod abuse;
pub mod behavior;
pub mod verdict;

pub use behavior::{BehaviorReducer, BehavioralMetrics};
pub use verdict::{Classification, DecisionPath, Tier2Status, Verdict, VerdictEngine};
