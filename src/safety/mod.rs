//! Safety and cleanup
//!
//! Per-analysis scratch space that never outlives its analysis.

pub mod workspace;

pub use workspace::ScratchDir;
