// Startup validation for SandboxConfig
// Errors always reject the config; strict mode also rejects on warnings

use crate::config::types::{PolicyAction, Result, SandboxConfig, SandboxError};
use crate::kernel::syscalls;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate config before the orchestrator probes anything
pub fn validate_config(config: &SandboxConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_runtime_limits(config, &mut result);
    validate_timeouts(config, &mut result);
    validate_paths(config, &mut result);
    validate_syscall_policy(config, &mut result);
    validate_scoring(config, &mut result);

    if !result.is_valid() {
        return Err(SandboxError::Config(format!(
            "config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    if config.strict_mode && !result.warnings.is_empty() {
        return Err(SandboxError::Config(format!(
            "config validation failed in strict mode:\n{}",
            result.warnings.join("\n")
        )));
    }

    for warning in &result.warnings {
        log::warn!("config: {}", warning);
    }

    Ok(result)
}

fn validate_runtime_limits(config: &SandboxConfig, result: &mut ValidationResult) {
    if config.memory_limit_bytes == 0 {
        result.add_error("memory_limit_bytes cannot be zero".to_string());
    } else if config.memory_limit_bytes < 64 * 1024 {
        result.add_warning(format!(
            "memory_limit_bytes {} is below one wasm page, every module will be rejected",
            config.memory_limit_bytes
        ));
    }

    if config.fuel_budget == 0 {
        result.add_error("fuel_budget cannot be zero".to_string());
    }

    if config.rlimits.address_space_bytes < 16 * 1024 * 1024 {
        result.add_warning(format!(
            "rlimits.address_space_bytes {} is very low, most interpreters will fail to start",
            config.rlimits.address_space_bytes
        ));
    }
    if config.rlimits.open_files < 8 {
        result.add_error("rlimits.open_files must be at least 8".to_string());
    }
}

fn validate_timeouts(config: &SandboxConfig, result: &mut ValidationResult) {
    if config.timeout_ms == 0 {
        result.add_error("timeout_ms cannot be zero".to_string());
    }
    if config.tier1_time_slice_ms == 0 {
        result.add_error("tier1_time_slice_ms cannot be zero".to_string());
    }
    if config.tier1_time_slice_ms >= config.timeout_ms {
        result.add_warning(format!(
            "tier1_time_slice_ms ({}) leaves no budget for Tier2 under the default timeout ({})",
            config.tier1_time_slice_ms, config.timeout_ms
        ));
    }
}

fn validate_paths(config: &SandboxConfig, result: &mut ValidationResult) {
    let scratch = &config.filesystem.scratch_root;
    if !scratch.is_absolute() {
        result.add_error(format!("scratch_root must be an absolute path: {:?}", scratch));
    } else if config.enable_tier2 && !scratch.is_dir() {
        result.add_warning(format!("scratch_root does not exist: {:?}", scratch));
    }

    for path in &config.filesystem.read_only_paths {
        if !path.is_absolute() {
            result.add_error(format!("read-only path must be absolute: {:?}", path));
        }
    }

    if let Some(module) = &config.tier1_module {
        if !module.is_file() {
            result.add_warning(format!(
                "tier1_module {:?} not found, Tier1 will use the heuristic",
                module
            ));
        }
    }
}

fn validate_syscall_policy(config: &SandboxConfig, result: &mut ValidationResult) {
    let policy = &config.syscall_policy;
    let sets = [
        ("allow", &policy.allow),
        ("log", &policy.log),
        ("deny", &policy.deny),
        ("kill", &policy.kill),
    ];

    for (label, set) in sets {
        for name in set.iter() {
            if syscalls::lookup_name(name).is_none() && !syscalls::is_known_elsewhere(name) {
                result.add_warning(format!("{} set names unknown syscall '{}'", label, name));
            }
        }
    }

    if !policy.allow.iter().any(|s| s == "execve") {
        result.add_error("execve must be allowed or the candidate can never start".to_string());
    }

    if policy.default_action == PolicyAction::Allow {
        result.add_warning("default syscall action is allow, the filter only narrows what is listed".to_string());
    }
}

fn validate_scoring(config: &SandboxConfig, result: &mut ValidationResult) {
    let weights = &config.scoring.weights;
    let all = [
        weights.file,
        weights.process,
        weights.memory,
        weights.network,
        weights.platform,
    ];
    if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
        result.add_error("scoring weights must be finite and non-negative".to_string());
    } else if (weights.total() - 1.0).abs() > 0.01 {
        result.add_warning(format!(
            "scoring weights sum to {:.2}, scores are normalized by the total",
            weights.total()
        ));
    }

    let verdict = &config.verdict;
    if !(0.0..=1.0).contains(&verdict.clean_below)
        || !(0.0..=1.0).contains(&verdict.malicious_at)
        || verdict.clean_below >= verdict.malicious_at
    {
        result.add_error(format!(
            "verdict thresholds must satisfy 0 <= clean_below ({}) < malicious_at ({}) <= 1",
            verdict.clean_below, verdict.malicious_at
        ));
    }
    if verdict.confident_clean_max > verdict.clean_below
        || verdict.confident_malicious_min < verdict.malicious_at
    {
        result.add_warning(
            "confidence bands overlap the suspicious range, Tier2 may be skipped on ambiguous input"
                .to_string(),
        );
    }
    if !(0.0..=1.0).contains(&verdict.tier1_fusion_weight) {
        result.add_error("tier1_fusion_weight must be within [0, 1]".to_string());
    }
}
