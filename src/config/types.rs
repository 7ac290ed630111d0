/// Core configuration and error types for the sentinel sandbox
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::presets;

/// Action applied by the syscall filter to a syscall set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Executed without involving the monitor
    Allow,
    /// Executed, but reported to the syscall monitor first
    Log,
    /// Reported to the monitor and answered with EPERM without executing
    Deny,
    /// Whole process killed by the kernel
    Kill,
}

impl PolicyAction {
    /// Precedence when one syscall appears in several sets (higher wins)
    pub fn severity(self) -> u8 {
        match self {
            PolicyAction::Allow => 0,
            PolicyAction::Log => 1,
            PolicyAction::Deny => 2,
            PolicyAction::Kill => 3,
        }
    }
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyAction::Allow => write!(f, "allow"),
            PolicyAction::Log => write!(f, "log"),
            PolicyAction::Deny => write!(f, "deny"),
            PolicyAction::Kill => write!(f, "kill"),
        }
    }
}

/// Syscall policy expressed as named sets
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyscallPolicy {
    /// Always allowed
    pub allow: Vec<String>,
    /// Allowed, reported to the monitor
    pub log: Vec<String>,
    /// Refused with EPERM, reported to the monitor
    pub deny: Vec<String>,
    /// Kill the sandboxed process
    pub kill: Vec<String>,
    /// Action for anything not listed
    pub default_action: PolicyAction,
}

impl Default for SyscallPolicy {
    fn default() -> Self {
        Self {
            allow: presets::names(presets::DEFAULT_ALLOW),
            log: presets::names(presets::DEFAULT_LOG),
            deny: presets::names(presets::DEFAULT_DENY),
            kill: presets::names(presets::DEFAULT_KILL),
            default_action: PolicyAction::Kill,
        }
    }
}

impl SyscallPolicy {
    /// Resolve the action for a syscall name; the most restrictive set wins
    pub fn action_for(&self, name: &str) -> PolicyAction {
        let sets = [
            (&self.kill, PolicyAction::Kill),
            (&self.deny, PolicyAction::Deny),
            (&self.log, PolicyAction::Log),
            (&self.allow, PolicyAction::Allow),
        ];
        for (set, action) in sets {
            if set.iter().any(|s| s == name) {
                return action;
            }
        }
        self.default_action
    }
}

/// Filesystem mount policy for the Tier2 sandbox
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemPolicy {
    /// System paths remounted read-only inside the sandbox mount namespace
    pub read_only_paths: Vec<PathBuf>,
    /// Parent directory for per-analysis scratch directories
    pub scratch_root: PathBuf,
}

impl Default for FilesystemPolicy {
    fn default() -> Self {
        Self {
            read_only_paths: ["/usr", "/bin", "/sbin", "/lib", "/lib64", "/etc"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            scratch_root: std::env::temp_dir(),
        }
    }
}

/// Resource limits applied to the Tier2 candidate process
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RlimitPolicy {
    /// RLIMIT_CPU in seconds; derived from the Tier2 budget when unset
    pub cpu_seconds: Option<u64>,
    /// RLIMIT_AS in bytes
    pub address_space_bytes: u64,
    /// RLIMIT_NOFILE
    pub open_files: u64,
    /// RLIMIT_FSIZE in bytes
    pub file_size_bytes: u64,
}

impl Default for RlimitPolicy {
    fn default() -> Self {
        Self {
            cpu_seconds: None,
            address_space_bytes: 512 * 1024 * 1024,
            open_files: 64,
            file_size_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Relative weight of each behavioral category in `threat_score`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub file: f32,
    pub process: f32,
    pub memory: f32,
    pub network: f32,
    pub platform: f32,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            file: 0.40,
            process: 0.30,
            memory: 0.15,
            network: 0.10,
            platform: 0.05,
        }
    }
}

impl CategoryWeights {
    pub fn total(&self) -> f32 {
        self.file + self.process + self.memory + self.network + self.platform
    }
}

/// Minimum `threat_score` imposed by a detected behavior pattern
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternFloors {
    pub ransomware: f32,
    pub process_injector: f32,
    pub rootkit: f32,
    pub dropper: f32,
    pub keylogger: f32,
    pub cryptominer: f32,
    pub policy_violation: f32,
}

impl Default for PatternFloors {
    fn default() -> Self {
        Self {
            ransomware: 0.75,
            process_injector: 0.70,
            rootkit: 0.70,
            dropper: 0.60,
            keylogger: 0.65,
            cryptominer: 0.60,
            policy_violation: 0.35,
        }
    }
}

/// Behavioral scoring policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub weights: CategoryWeights,
    pub pattern_floors: PatternFloors,
    /// Sliding window for the rapid-write counter
    pub ransomware_window_ms: u64,
    /// Writes inside one window before each further write counts as a burst hit
    pub ransomware_burst_threshold: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            pattern_floors: PatternFloors::default(),
            ransomware_window_ms: 2000,
            ransomware_burst_threshold: 20,
        }
    }
}

/// Verdict thresholds and confidence policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictPolicy {
    /// Scores below this are Clean
    pub clean_below: f32,
    /// Scores at or above this are Malicious
    pub malicious_at: f32,
    /// Tier1 at or below this is confidently clean (Tier2 skipped)
    pub confident_clean_max: f32,
    /// Tier1 at or above this is confidently malicious (Tier2 skipped)
    pub confident_malicious_min: f32,
    /// Weight of the pattern score in the Tier1 blend
    pub tier1_pattern_weight: f32,
    /// Weight of Tier1 when fusing with Tier2
    pub tier1_fusion_weight: f32,
    /// Confidence ceiling when only a runtime-backed Tier1 contributed
    pub tier1_only_confidence_cap: f32,
    /// Confidence ceiling when only the degraded heuristic contributed
    pub degraded_confidence_cap: f32,
    /// Confidence reported when no tier produced a signal
    pub min_confidence: f32,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            clean_below: 0.3,
            malicious_at: 0.6,
            confident_clean_max: 0.2,
            confident_malicious_min: 0.8,
            tier1_pattern_weight: 0.55,
            tier1_fusion_weight: 0.4,
            tier1_only_confidence_cap: 0.85,
            degraded_confidence_cap: 0.8,
            min_confidence: 0.05,
        }
    }
}

/// Resource policy for one analysis
///
/// Supplied by the embedding application; immutable for the lifetime of an
/// analysis.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Linear memory ceiling for Tier1 modules (bytes)
    pub memory_limit_bytes: u64,
    /// Instruction budget for one Tier1 module call
    pub fuel_budget: u64,
    /// Default overall timeout when the caller does not supply one (ms)
    pub timeout_ms: u64,
    /// Fixed slice of the overall timeout reserved for Tier1 (ms)
    pub tier1_time_slice_ms: u64,
    /// Tier2 is not started with less than this much budget left (ms)
    pub tier2_min_budget_ms: u64,
    /// Run the Tier2 candidate in a fresh network namespace
    pub network_isolation: bool,
    /// Filesystem policy
    pub filesystem: FilesystemPolicy,
    /// Syscall policy sets
    pub syscall_policy: SyscallPolicy,
    /// Resource limits for the candidate process
    pub rlimits: RlimitPolicy,
    /// Behavioral scoring
    pub scoring: ScoringPolicy,
    /// Verdict thresholds
    pub verdict: VerdictPolicy,
    /// Fail instead of degrading when an isolation layer cannot be applied
    pub strict_mode: bool,
    /// Tier2 may be disabled entirely
    pub enable_tier2: bool,
    /// Analysis module loaded into the Tier1 runtime
    pub tier1_module: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 128 * 1024 * 1024,
            fuel_budget: 500_000_000,
            timeout_ms: 10_000,
            tier1_time_slice_ms: 1_000,
            tier2_min_budget_ms: 250,
            network_isolation: true, // no network unless asked for
            filesystem: FilesystemPolicy::default(),
            syscall_policy: SyscallPolicy::default(),
            rlimits: RlimitPolicy::default(),
            scoring: ScoringPolicy::default(),
            verdict: VerdictPolicy::default(),
            strict_mode: false,
            enable_tier2: true,
            tier1_module: None,
        }
    }
}

impl SandboxConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn tier1_time_slice(&self) -> Duration {
        Duration::from_millis(self.tier1_time_slice_ms)
    }
}

/// Error taxonomy for the sandbox core
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Runtime or sandbox technology missing on this host; a degraded-mode signal
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Module load error: {0}")]
    ModuleLoad(String),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Execution trap: {0}")]
    ExecutionTrap(String),

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Monitor attach error: {0}")]
    MonitorAttach(String),

    #[error("Result decode error: {0}")]
    ResultDecode(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Cannot fork or cannot create scratch space
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Errors returned to the caller instead of degrading to "no signal"
    pub fn is_fatal_to_analysis(&self) -> bool {
        matches!(self, SandboxError::ResourceExhausted(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Classify a failed fork/exec
    pub fn from_spawn_error(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::ENOMEM) => {
                SandboxError::ResourceExhausted(format!("cannot fork sandbox process: {}", err))
            }
            _ => SandboxError::ProcessSpawn(err.to_string()),
        }
    }
}

impl From<nix::errno::Errno> for SandboxError {
    fn from(errno: nix::errno::Errno) -> Self {
        match errno {
            nix::errno::Errno::EAGAIN | nix::errno::Errno::ENOMEM => {
                SandboxError::ResourceExhausted(errno.desc().to_string())
            }
            other => SandboxError::Io(std::io::Error::from(other)),
        }
    }
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;
