//! Configuration and policy
//!
//! Sandbox resource policy, default syscall sets, and startup validation.

pub mod presets;
pub mod types;
pub mod validator;
