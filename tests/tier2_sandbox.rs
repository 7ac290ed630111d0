//! Dynamic tier integration tests
//!
//! These need ptrace and a working seccomp on the host. When the probe says
//! the sandbox is unavailable each test prints why and returns.
#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use sentinel_sandbox::config::types::Result;
use sentinel_sandbox::core::supervisor::Tier2Sandbox;
use sentinel_sandbox::core::types::{AnalysisRequest, Capability, SandboxState};
use sentinel_sandbox::tier1::{Tier1Result, Tier1Source, TierExecutor};
use sentinel_sandbox::{DecisionPath, Orchestrator, SandboxConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FILE_STORM: &[u8] = b"#!/bin/sh\ni=0\nwhile [ $i -lt 200 ]; do echo data > f$i; i=$((i+1)); done\n";
const SPIN: &[u8] = b"#!/bin/sh\nwhile :; do :; done\n";
const QUIET: &[u8] = b"#!/bin/sh\nexit 0\n";

fn sandbox(config: &SandboxConfig) -> Option<Tier2Sandbox> {
    match Tier2Sandbox::probe(config) {
        Capability::Available(sandbox) => Some(sandbox),
        Capability::Unavailable { reason } => {
            eprintln!("skipping: Tier2 unavailable on this host ({})", reason);
            None
        }
    }
}

fn request(content: &[u8], name: &str, timeout: Duration, config: &Arc<SandboxConfig>) -> AnalysisRequest {
    AnalysisRequest::new(content, name, timeout, Arc::clone(config))
}

fn assert_no_zombie(pid: i32) {
    match waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG)) {
        Err(Errno::ECHILD) => {}
        other => panic!("process {} was not reaped: {:?}", pid, other),
    }
}

#[test]
fn scenario_c_file_storm_is_scored_high() {
    let config = Arc::new(SandboxConfig::default());
    let Some(sandbox) = sandbox(&config) else { return };

    let budget = Duration::from_secs(5);
    let report = sandbox
        .run(&request(FILE_STORM, "storm.sh", budget, &config), budget)
        .unwrap();

    assert_eq!(report.terminal_state, SandboxState::Completed, "{:?}", report.kill);
    assert!(
        report.metrics.file_operations() > 100,
        "file ops {}",
        report.metrics.file_operations()
    );
    assert!(report.metrics.threat_score > 0.6, "score {}", report.metrics.threat_score);
    assert!(!report.metrics.timed_out);
    assert_no_zombie(report.root_pid);
}

#[test]
fn scenario_d_infinite_loop_is_killed_on_time() {
    let config = Arc::new(SandboxConfig::default());
    let Some(sandbox) = sandbox(&config) else { return };

    let budget = Duration::from_secs(5);
    let started = Instant::now();
    let report = sandbox
        .run(&request(SPIN, "spin.sh", budget, &config), budget)
        .unwrap();
    let elapsed = started.elapsed();

    assert!(report.metrics.timed_out);
    assert_eq!(report.terminal_state, SandboxState::TimedOut);
    assert!(report.kill.watchdog_fired);
    assert!(report.kill.reaped);
    assert!(elapsed <= budget + Duration::from_millis(1500), "took {:?}", elapsed);
    assert_no_zombie(report.root_pid);
}

#[test]
fn quiet_script_completes_with_low_score() {
    let config = Arc::new(SandboxConfig::default());
    let Some(sandbox) = sandbox(&config) else { return };

    let budget = Duration::from_secs(5);
    let report = sandbox
        .run(&request(QUIET, "quiet.sh", budget, &config), budget)
        .unwrap();

    assert_eq!(report.terminal_state, SandboxState::Completed);
    assert!(report.metrics.threat_score < 0.3, "score {}", report.metrics.threat_score);
    assert!(report.kill.reaped);
    assert_no_zombie(report.root_pid);
}

#[test]
fn scratch_directory_is_removed_after_run() {
    let scratch = std::env::temp_dir().join(format!("sentinel-test-root-{}", std::process::id()));
    std::fs::create_dir_all(&scratch).unwrap();
    let mut config = SandboxConfig::default();
    config.filesystem.scratch_root = scratch.clone();
    let config = Arc::new(config);
    let Some(sandbox) = sandbox(&config) else {
        let _ = std::fs::remove_dir_all(&scratch);
        return;
    };

    let budget = Duration::from_secs(5);
    sandbox
        .run(&request(FILE_STORM, "storm.sh", budget, &config), budget)
        .unwrap();

    let leftovers = std::fs::read_dir(&scratch).unwrap().count();
    std::fs::remove_dir_all(&scratch).unwrap();
    assert_eq!(leftovers, 0);
}

/// Tier1 stand-in that always lands in the escalation band
struct Inconclusive;

impl TierExecutor for Inconclusive {
    fn name(&self) -> &'static str {
        "inconclusive"
    }

    fn execute(&self, _request: &AnalysisRequest, _budget: Duration) -> Result<Tier1Result> {
        Ok(Tier1Result {
            pattern_score: 0.5,
            ml_score: 0.5,
            detected_pattern_count: 0,
            execution_time_us: 1,
            error_code: 0,
            timed_out: false,
            degraded: false,
            source: Tier1Source::Heuristic,
            findings: Vec::new(),
        })
    }
}

#[test]
fn inconclusive_tier1_escalates_and_fuses() {
    let orchestrator = Orchestrator::with_executor(SandboxConfig::default(), Box::new(Inconclusive)).unwrap();
    if !orchestrator.tier2_available() {
        eprintln!("skipping: {}", orchestrator.capabilities().tier2);
        return;
    }

    let verdict = orchestrator
        .analyze(FILE_STORM, "storm.sh", Duration::from_secs(6))
        .unwrap();
    assert!(matches!(
        verdict.decision_path,
        DecisionPath::Fused | DecisionPath::Disagreement
    ));
    assert!(verdict.tier2_score.unwrap() > 0.6);

    let stats = orchestrator.get_statistics();
    assert_eq!(stats.tier2_runs, 1);
    assert_eq!(stats.tier2_skipped, 0);
}

#[test]
fn non_executable_content_is_not_escalated_to_tier2() {
    let orchestrator = Orchestrator::with_executor(SandboxConfig::default(), Box::new(Inconclusive)).unwrap();
    let verdict = orchestrator
        .analyze(b"just some notes", "notes.txt", Duration::from_secs(2))
        .unwrap();
    assert_eq!(verdict.decision_path, DecisionPath::Tier1Only);
    assert_eq!(orchestrator.get_statistics().tier2_runs, 0);
}
