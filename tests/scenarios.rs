/// End-to-end verdict scenarios that do not need the dynamic tier
use sentinel_sandbox::config::types::{Result, VerdictPolicy};
use sentinel_sandbox::core::types::AnalysisRequest;
use sentinel_sandbox::tier1::{Tier1Result, Tier1Source, TierExecutor};
use sentinel_sandbox::verdict::{Tier2Status, VerdictEngine};
use sentinel_sandbox::{BehavioralMetrics, Classification, DecisionPath, Orchestrator, SandboxConfig};
use std::time::Duration;

const EICAR: &[u8] = br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
const GREETING: &[u8] = b"Hello there! Thanks for downloading. Have a great day.";

fn orchestrator() -> Orchestrator {
    Orchestrator::new(SandboxConfig::default()).unwrap()
}

#[test]
fn scenario_a_eicar_is_malicious() {
    assert_eq!(EICAR.len(), 68);
    let orchestrator = orchestrator();
    let verdict = orchestrator.analyze(EICAR, "eicar.com", Duration::from_secs(5)).unwrap();

    assert_eq!(verdict.classification, Classification::Malicious);
    assert!(verdict.tier1_score.unwrap() > 0.5);
    assert_eq!(verdict.tier2_score, None);
    // the built-in heuristic is a degraded signal, so it escalates; EICAR is
    // not executable content and the dynamic tier never starts
    assert_eq!(verdict.decision_path, DecisionPath::Tier1Only);
    assert!(verdict.confidence <= VerdictPolicy::default().degraded_confidence_cap);

    let stats = orchestrator.get_statistics();
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.tier1_degraded, 1);
    assert_eq!(stats.verdicts_malicious, 1);
    assert_eq!(stats.tier2_runs, 0);
    assert_eq!(stats.tier2_skipped, 1);
}

/// Tier1 stand-in with a clean, decisive module signal
struct ConfidentModule(f32);

impl TierExecutor for ConfidentModule {
    fn name(&self) -> &'static str {
        "confident-module"
    }

    fn execute(&self, _request: &AnalysisRequest, _budget: Duration) -> Result<Tier1Result> {
        Ok(Tier1Result {
            pattern_score: self.0,
            ml_score: self.0,
            detected_pattern_count: 1,
            execution_time_us: 10,
            error_code: 0,
            timed_out: false,
            degraded: false,
            source: Tier1Source::Module {
                version: 1,
                fingerprint: "cd".repeat(32),
            },
            findings: Vec::new(),
        })
    }
}

#[test]
fn decisive_module_signal_skips_the_dynamic_tier() {
    let orchestrator = Orchestrator::with_executor(SandboxConfig::default(), Box::new(ConfidentModule(0.95))).unwrap();
    let verdict = orchestrator
        .analyze(b"#!/bin/sh\nexit 0\n", "run.sh", Duration::from_secs(5))
        .unwrap();

    assert_eq!(verdict.classification, Classification::Malicious);
    assert_eq!(verdict.decision_path, DecisionPath::Tier1Confident);
    let stats = orchestrator.get_statistics();
    assert_eq!(stats.tier2_runs, 0);
    assert_eq!(stats.tier2_skipped, 1);
}

#[test]
fn scenario_b_greeting_is_clean() {
    assert_eq!(GREETING.len(), 54);
    let orchestrator = orchestrator();
    let verdict = orchestrator.analyze(GREETING, "greeting.txt", Duration::from_secs(5)).unwrap();

    assert_eq!(verdict.classification, Classification::Clean);
    assert!(verdict.tier1_score.unwrap() < 0.2);
    assert!(verdict.confidence >= 0.7, "confidence {}", verdict.confidence);
    assert_eq!(orchestrator.get_statistics().verdicts_clean, 1);
}

#[test]
fn scenario_e_disagreement_is_suspicious() {
    let engine = VerdictEngine::new(VerdictPolicy::default());
    let tier1 = Tier1Result {
        pattern_score: 0.1,
        ml_score: 0.1,
        detected_pattern_count: 0,
        execution_time_us: 40,
        error_code: 0,
        timed_out: false,
        degraded: false,
        source: Tier1Source::Module {
            version: 1,
            fingerprint: "ab".repeat(32),
        },
        findings: Vec::new(),
    };
    let metrics = BehavioralMetrics {
        threat_score: 0.9,
        ..Default::default()
    };

    let verdict = engine.decide("00", Some(&tier1), Tier2Status::Ran(&metrics));
    assert_eq!(verdict.classification, Classification::Suspicious);
    assert_eq!(verdict.decision_path, DecisionPath::Disagreement);

    let agreeing = engine.decide("00", Some(&tier1), Tier2Status::Skipped);
    assert!(
        verdict.confidence < agreeing.confidence,
        "disagreement {} vs single tier {}",
        verdict.confidence,
        agreeing.confidence
    );
}

#[test]
fn repeated_analyses_accumulate_statistics() {
    let orchestrator = orchestrator();
    for _ in 0..3 {
        orchestrator.analyze(GREETING, "greeting.txt", Duration::from_secs(5)).unwrap();
    }
    orchestrator.analyze(EICAR, "eicar.com", Duration::from_secs(5)).unwrap();

    let stats = orchestrator.get_statistics();
    assert_eq!(stats.executions, 4);
    assert_eq!(stats.tier1_runs, 4);
    assert_eq!(stats.verdicts_clean, 3);
    assert_eq!(stats.verdicts_malicious, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.max_latency_ms as f64 >= stats.average_latency_ms.floor());
}

#[test]
fn verdict_serializes_for_callers() {
    let verdict = orchestrator()
        .analyze(EICAR, "eicar.com", Duration::from_secs(5))
        .unwrap();
    let value = serde_json::to_value(&verdict).unwrap();
    assert_eq!(value["classification"], "Malicious");
    assert_eq!(value["fingerprint"].as_str().map(str::len), Some(64));
    assert!(value["explanation"].as_str().is_some_and(|s| !s.is_empty()));
}

#[test]
fn concurrent_analyses_keep_statistics_consistent() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 10;

    let orchestrator = orchestrator();
    std::thread::scope(|scope| {
        for worker in 0..THREADS {
            let orchestrator = &orchestrator;
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    let (content, name) = if (worker + i) % 2 == 0 {
                        (GREETING, "greeting.txt")
                    } else {
                        (EICAR, "eicar.com")
                    };
                    orchestrator.analyze(content, name, Duration::from_secs(5)).unwrap();
                }
            });
        }
    });

    let total = (THREADS * PER_THREAD) as u64;
    let stats = orchestrator.get_statistics();
    assert_eq!(stats.executions, total);
    assert_eq!(stats.tier1_runs, total);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.verdicts_clean, total / 2);
    assert_eq!(stats.verdicts_malicious, total / 2);
    assert_eq!(
        stats.verdicts_clean + stats.verdicts_suspicious + stats.verdicts_malicious,
        stats.executions
    );
    assert_eq!(stats.tier2_runs + stats.tier2_skipped, stats.executions);
    assert_eq!(stats.latency_buckets.last().map(|(_, count)| *count), Some(total));
}
