//! Thin wrappers around Linux kernel primitives.
//!
//! Every `unsafe` block carries an explicit SAFETY comment.
//! Dependency direction: syscalls -> seccomp; namespace stands alone.

pub mod namespace;
pub mod seccomp;
pub mod syscalls;
