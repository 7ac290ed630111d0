//! Execution control
//!
//! Child-side setup for the Tier2 candidate, enforced as a type-state chain.

pub mod preexec;

pub use preexec::{ChildPlan, ChildSetup, RlimitSet};
