//! Tier1 runtime
//!
//! WebAssembly engine with fuel, epoch watchdog, and memory ceiling.

pub mod wasm;

pub use wasm::{LoadedModule, ModuleInstance, ResourceLimitedRuntime, RuntimeLimits};
