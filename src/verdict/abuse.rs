/// Behavior pattern detectors
/// Each detector reads the folded metrics of one Tier2 run and reports a
/// named finding. A detected pattern puts a floor under the threat score.
use crate::config::types::PatternFloors;
use crate::verdict::behavior::BehavioralMetrics;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorPattern {
    Ransomware,
    Keylogger,
    Rootkit,
    Cryptominer,
    ProcessInjector,
    Dropper,
    PolicyViolation,
}

impl BehaviorPattern {
    pub fn floor(self, floors: &PatternFloors) -> f32 {
        match self {
            BehaviorPattern::Ransomware => floors.ransomware,
            BehaviorPattern::Keylogger => floors.keylogger,
            BehaviorPattern::Rootkit => floors.rootkit,
            BehaviorPattern::Cryptominer => floors.cryptominer,
            BehaviorPattern::ProcessInjector => floors.process_injector,
            BehaviorPattern::Dropper => floors.dropper,
            BehaviorPattern::PolicyViolation => floors.policy_violation,
        }
    }
}

impl std::fmt::Display for BehaviorPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BehaviorPattern::Ransomware => "ransomware",
            BehaviorPattern::Keylogger => "keylogger",
            BehaviorPattern::Rootkit => "rootkit",
            BehaviorPattern::Cryptominer => "cryptominer",
            BehaviorPattern::ProcessInjector => "process-injector",
            BehaviorPattern::Dropper => "dropper",
            BehaviorPattern::PolicyViolation => "policy-violation",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedPattern {
    pub pattern: BehaviorPattern,
    pub severity: Severity,
    pub description: String,
}

/// Run every detector over the metrics
pub fn detect(metrics: &BehavioralMetrics, burst_threshold: usize) -> Vec<DetectedPattern> {
    [
        detect_ransomware(metrics, burst_threshold),
        detect_keylogger(metrics),
        detect_rootkit(metrics),
        detect_cryptominer(metrics),
        detect_process_injector(metrics),
        detect_dropper(metrics),
        detect_policy_violation(metrics),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Highest floor among detected patterns, 0.0 when none
pub fn pattern_floor(patterns: &[DetectedPattern], floors: &PatternFloors) -> f32 {
    patterns
        .iter()
        .map(|p| p.pattern.floor(floors))
        .fold(0.0, f32::max)
}

fn detect_ransomware(m: &BehavioralMetrics, burst_threshold: usize) -> Option<DetectedPattern> {
    let mutations = m.file.writes + m.file.deletes + m.file.renames;
    if m.ransomware_pattern_hits == 0 || mutations < burst_threshold as u64 {
        return None;
    }
    let severity = if m.file.renames > 0 || m.file.deletes > 0 {
        Severity::Critical
    } else {
        Severity::High
    };
    Some(DetectedPattern {
        pattern: BehaviorPattern::Ransomware,
        severity,
        description: format!(
            "Burst file mutation: {} writes, {} deletes, {} renames ({} bursts)",
            m.file.writes, m.file.deletes, m.file.renames, m.ransomware_pattern_hits
        ),
    })
}

fn detect_keylogger(m: &BehavioralMetrics) -> Option<DetectedPattern> {
    if m.file.input_device_access == 0 {
        return None;
    }
    let exfil = m.network.outbound_connections > 0 || m.file.hidden_files > 0;
    Some(DetectedPattern {
        pattern: BehaviorPattern::Keylogger,
        severity: if exfil { Severity::High } else { Severity::Medium },
        description: format!("Input device access ({} opens)", m.file.input_device_access),
    })
}

fn detect_rootkit(m: &BehavioralMetrics) -> Option<DetectedPattern> {
    let stealthy_persistence = m.file.persistence_attempts > 0 && m.file.hidden_files > 0;
    if m.file.kernel_interface_access == 0 && !stealthy_persistence && !m.platform.policy_kill {
        return None;
    }
    let mut reasons = Vec::new();
    if m.file.kernel_interface_access > 0 {
        reasons.push(format!("{} kernel interface accesses", m.file.kernel_interface_access));
    }
    if stealthy_persistence {
        reasons.push("hidden persistence files".to_string());
    }
    if m.platform.policy_kill {
        reasons.push("killed for a forbidden syscall".to_string());
    }
    Some(DetectedPattern {
        pattern: BehaviorPattern::Rootkit,
        severity: Severity::Critical,
        description: format!("Kernel tampering: {}", reasons.join(", ")),
    })
}

fn detect_cryptominer(m: &BehavioralMetrics) -> Option<DetectedPattern> {
    // CPU-bound until the deadline while holding a network peer open
    if !m.timed_out || m.network.outbound_connections == 0 || m.file.total() > 100 {
        return None;
    }
    Some(DetectedPattern {
        pattern: BehaviorPattern::Cryptominer,
        severity: Severity::Medium,
        description: format!(
            "Ran until the deadline with {} outbound connections",
            m.network.outbound_connections
        ),
    })
}

fn detect_process_injector(m: &BehavioralMetrics) -> Option<DetectedPattern> {
    if m.process_injection_attempts == 0 && m.code_injection_attempts == 0 {
        return None;
    }
    let severity = if m.process_injection_attempts > 0 {
        Severity::Critical
    } else {
        Severity::High
    };
    Some(DetectedPattern {
        pattern: BehaviorPattern::ProcessInjector,
        severity,
        description: format!(
            "{} cross-process writes or attaches, {} W+X memory changes",
            m.process_injection_attempts, m.code_injection_attempts
        ),
    })
}

fn detect_dropper(m: &BehavioralMetrics) -> Option<DetectedPattern> {
    if m.file.executable_drops == 0 {
        return None;
    }
    let launched = m.process.execs > 0;
    let fetched = m.network.outbound_connections > 0;
    if !launched && !fetched {
        return None;
    }
    Some(DetectedPattern {
        pattern: BehaviorPattern::Dropper,
        severity: if launched && fetched { Severity::Critical } else { Severity::High },
        description: format!(
            "Wrote {} executable files then {}",
            m.file.executable_drops,
            if launched { "executed a program" } else { "contacted a remote host" }
        ),
    })
}

/// A kill for a syscall the policy never names; sloppy or unusual, not tampering
fn detect_policy_violation(m: &BehavioralMetrics) -> Option<DetectedPattern> {
    if m.platform.unlisted_kills == 0 {
        return None;
    }
    Some(DetectedPattern {
        pattern: BehaviorPattern::PolicyViolation,
        severity: Severity::Medium,
        description: format!("Killed for {} unlisted syscalls", m.platform.unlisted_kills),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_run_has_no_patterns() {
        let metrics = BehavioralMetrics::default();
        assert!(detect(&metrics, 20).is_empty());
        assert_eq!(pattern_floor(&[], &PatternFloors::default()), 0.0);
    }

    #[test]
    fn test_ransomware_needs_a_burst() {
        let mut metrics = BehavioralMetrics::default();
        metrics.file.writes = 200;
        assert!(detect(&metrics, 20).is_empty());

        metrics.ransomware_pattern_hits = 3;
        metrics.file.renames = 5;
        let found = detect(&metrics, 20);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern, BehaviorPattern::Ransomware);
        assert_eq!(found[0].severity, Severity::Critical);
    }

    #[test]
    fn test_dropper_requires_follow_up() {
        let mut metrics = BehavioralMetrics::default();
        metrics.file.executable_drops = 1;
        assert!(detect(&metrics, 20).is_empty());

        metrics.process.execs = 1;
        let found = detect(&metrics, 20);
        assert_eq!(found[0].pattern, BehaviorPattern::Dropper);
    }

    #[test]
    fn test_floor_takes_the_highest() {
        let floors = PatternFloors::default();
        let mut metrics = BehavioralMetrics::default();
        metrics.process_injection_attempts = 1;
        metrics.file.input_device_access = 1;
        let found = detect(&metrics, 20);
        assert_eq!(found.len(), 2);
        let expected = floors.process_injector.max(floors.keylogger);
        assert_eq!(pattern_floor(&found, &floors), expected);
    }

    #[test]
    fn test_policy_kill_reads_as_rootkit() {
        let mut metrics = BehavioralMetrics::default();
        metrics.platform.policy_kill = true;
        let found = detect(&metrics, 20);
        assert_eq!(found[0].pattern, BehaviorPattern::Rootkit);
    }

    #[test]
    fn test_unlisted_kill_is_only_a_violation() {
        let floors = PatternFloors::default();
        let mut metrics = BehavioralMetrics::default();
        metrics.platform.unlisted_kills = 1;
        let found = detect(&metrics, 20);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern, BehaviorPattern::PolicyViolation);
        assert_eq!(found[0].severity, Severity::Medium);
        assert!(pattern_floor(&found, &floors) < floors.rootkit);
    }
}
