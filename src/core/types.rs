use crate::config::types::SandboxConfig;
use crate::verdict::behavior::BehavioralMetrics;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a one-time capability probe.
///
/// Probes run once at construction; callers branch on this value instead of
/// re-discovering support inside every analysis.
#[derive(Debug)]
pub enum Capability<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Capability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Capability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Capability::Available(value) => Some(value),
            Capability::Unavailable { .. } => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Capability::Available(value) => Some(value),
            Capability::Unavailable { .. } => None,
        }
    }

    /// Human-readable status for capability reports
    pub fn status(&self) -> String {
        match self {
            Capability::Available(_) => "available".to_string(),
            Capability::Unavailable { reason } => format!("unavailable: {}", reason),
        }
    }
}

/// Immutable description of one analysis
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    id: Uuid,
    content: Arc<[u8]>,
    filename: String,
    timeout: Duration,
    config: Arc<SandboxConfig>,
    fingerprint: String,
}

impl AnalysisRequest {
    pub fn new(content: &[u8], filename: &str, timeout: Duration, config: Arc<SandboxConfig>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: Arc::from(content),
            filename: filename.to_string(),
            timeout,
            config,
            fingerprint: sha256_hex(content),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// SHA-256 of the content, lowercase hex
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lifecycle of one Tier2 run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Idle,
    Prepared,
    Running,
    Completed,
    TimedOut,
    Crashed,
    Reaped,
}

impl SandboxState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SandboxState::Completed | SandboxState::TimedOut | SandboxState::Crashed
        )
    }

    /// Legal forward transitions
    pub fn can_advance_to(self, next: SandboxState) -> bool {
        use SandboxState::*;
        matches!(
            (self, next),
            (Idle, Prepared)
                | (Prepared, Running)
                | (Running, Completed)
                | (Running, TimedOut)
                | (Running, Crashed)
                | (Completed, Reaped)
                | (TimedOut, Reaped)
                | (Crashed, Reaped)
        )
    }
}

/// How the root sandbox process ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ExitKind {
    Exited(i32),
    Signaled(i32),
}

impl ExitKind {
    /// SIGSYS is how the seccomp filter kills a process
    pub fn killed_by_filter(self) -> bool {
        self == ExitKind::Signaled(libc::SIGSYS)
    }
}

/// Signal and reap bookkeeping for one run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub watchdog_fired: bool,
    pub group_kill_sent: bool,
    pub stragglers_killed: u32,
    pub reaped: bool,
    pub notes: Vec<String>,
}

/// Everything one Tier2 run produced
#[derive(Clone, Debug, Serialize)]
pub struct Tier2Report {
    pub metrics: BehavioralMetrics,
    pub terminal_state: SandboxState,
    pub exit: Option<ExitKind>,
    pub root_pid: i32,
    pub monitor: String,
    pub namespaces: Vec<String>,
    pub events_observed: u64,
    pub kill: KillReport,
    pub wall_time_ms: u64,
}

/// Host capabilities as seen by the orchestrator at construction
#[derive(Clone, Debug, Serialize)]
pub struct CapabilityReport {
    pub runtime: String,
    pub tier1_executor: String,
    pub tier2: String,
    pub monitor: Option<String>,
    pub seccomp: String,
    pub namespaces: Vec<String>,
    pub running_as_root: bool,
}
