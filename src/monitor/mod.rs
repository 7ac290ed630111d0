//! Syscall monitor
//!
//! Observes the Tier2 process tree through ptrace and streams decoded
//! syscall events into a sink. Runs on x86_64 Linux only.

pub mod decode;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod tracer;

use crate::kernel::seccomp;
use crate::kernel::syscalls::SyscallCategory;
use serde::Serialize;
use std::time::Duration;

/// How syscalls reach the monitor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMechanism {
    /// Seccomp filter returns SECCOMP_RET_TRACE for logged and denied calls
    SeccompTrace,
    /// PTRACE_SYSCALL on every syscall entry and exit; policy enforced by the tracer
    SyscallStep,
}

impl std::fmt::Display for MonitorMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorMechanism::SeccompTrace => write!(f, "seccomp-trace"),
            MonitorMechanism::SyscallStep => write!(f, "syscall-step"),
        }
    }
}

impl MonitorMechanism {
    /// Pick the best mechanism the host supports, if any
    pub fn select() -> Option<Self> {
        if !cfg!(all(target_os = "linux", target_arch = "x86_64")) {
            return None;
        }
        if seccomp::is_seccomp_supported() && seccomp::supports_trace_action() {
            Some(MonitorMechanism::SeccompTrace)
        } else {
            Some(MonitorMechanism::SyscallStep)
        }
    }
}

/// What happened to an observed syscall
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Executed normally
    Allowed,
    /// Refused with EPERM
    Denied,
    /// The process was killed for a call in the kill set
    Killed,
    /// The process was killed for a call no rule names
    Unlisted,
}

/// One observed syscall
#[derive(Clone, Debug, Serialize)]
pub struct SyscallEvent {
    pub pid: i32,
    pub number: i64,
    pub name: &'static str,
    pub category: SyscallCategory,
    pub args: [u64; 6],
    /// Monotonic time since the run started
    pub timestamp: Duration,
    pub path: Option<String>,
    pub endpoint: Option<String>,
    pub disposition: Disposition,
}

/// Consumer of monitor output
pub trait TraceSink {
    fn on_syscall(&mut self, event: &SyscallEvent);

    /// A traced process created a child
    fn on_spawn(&mut self, parent: i32, child: i32);

    /// A traced process completed an exec
    fn on_exec(&mut self, pid: i32);
}

/// Human-readable monitor availability for capability reports
pub fn describe_support() -> String {
    match MonitorMechanism::select() {
        Some(mechanism) => mechanism.to_string(),
        None => "unsupported on this platform".to_string(),
    }
}
