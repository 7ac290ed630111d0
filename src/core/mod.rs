//! Sandbox core
//!
//! Shared analysis types, the Tier2 supervisor, and the orchestrator that
//! ties both tiers to the verdict engine.

pub mod orchestrator;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod supervisor;
#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
#[path = "unsupported.rs"]
pub mod supervisor;
pub mod types;

pub use orchestrator::Orchestrator;
