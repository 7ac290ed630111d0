// Analysis orchestrator
//
// Single entry point: always runs Tier1, asks the verdict engine whether to
// escalate, runs Tier2 inside whatever budget remains, and fuses the result.
// Capabilities are probed once here and cached for the orchestrator's life.

use crate::config::types::{Result, SandboxConfig};
use crate::config::validator::validate_config;
use crate::core::supervisor::Tier2Sandbox;
use crate::core::types::{AnalysisRequest, Capability, CapabilityReport, Tier2Report};
use crate::kernel::seccomp;
use crate::monitor;
use crate::observability::audit::{self, AuditEvent};
use crate::observability::metrics::{AnalysisSample, OrchestratorStats, StatsSnapshot};
use crate::runtime::ResourceLimitedRuntime;
use crate::safety::workspace::sweep_stale;
use crate::tier1::{FallbackExecutor, HeuristicExecutor, Tier1Result, TierExecutor, WasmTier1Executor};
use crate::verdict::verdict::Escalation;
use crate::verdict::{Tier2Status, Verdict, VerdictEngine};
use nix::unistd::Uid;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scratch directories older than this are leftovers from a crashed process
const STALE_SCRATCH_AGE: Duration = Duration::from_secs(3600);

/// Owned form of what happened to Tier2 in one analysis
enum Tier2Outcome {
    Ran(Box<Tier2Report>),
    Skipped,
    Unavailable(String),
    NotApplicable,
    OutOfTime,
    Failed(String),
}

impl Tier2Outcome {
    fn status(&self) -> Tier2Status<'_> {
        match self {
            Tier2Outcome::Ran(report) => Tier2Status::Ran(&report.metrics),
            Tier2Outcome::Skipped => Tier2Status::Skipped,
            Tier2Outcome::Unavailable(reason) => Tier2Status::Unavailable(reason),
            Tier2Outcome::NotApplicable => Tier2Status::NotApplicable,
            Tier2Outcome::OutOfTime => Tier2Status::OutOfTime,
            Tier2Outcome::Failed(reason) => Tier2Status::Failed(reason),
        }
    }
}

pub struct Orchestrator {
    config: Arc<SandboxConfig>,
    tier1: Box<dyn TierExecutor>,
    tier2: Capability<Tier2Sandbox>,
    engine: VerdictEngine,
    stats: OrchestratorStats,
    capabilities: CapabilityReport,
}

impl Orchestrator {
    /// Validate the configuration and probe every capability once
    pub fn new(config: SandboxConfig) -> Result<Self> {
        validate_config(&config)?;
        let runtime = ResourceLimitedRuntime::probe(&config);
        let runtime_status = runtime.status();
        let tier1 = select_tier1(runtime, &config)?;
        Self::assemble(config, tier1, runtime_status)
    }

    /// Use a caller-supplied Tier1 executor instead of probing for one
    pub fn with_executor(config: SandboxConfig, tier1: Box<dyn TierExecutor>) -> Result<Self> {
        validate_config(&config)?;
        Self::assemble(config, tier1, "not probed".to_string())
    }

    fn assemble(config: SandboxConfig, tier1: Box<dyn TierExecutor>, runtime_status: String) -> Result<Self> {
        match sweep_stale(&config.filesystem.scratch_root, STALE_SCRATCH_AGE) {
            Ok(0) => {}
            Ok(n) => log::info!("Removed {} stale scratch directories", n),
            Err(e) => log::warn!("Could not sweep scratch root: {}", e),
        }

        let tier2 = Tier2Sandbox::probe(&config);
        if let Capability::Unavailable { reason } = &tier2 {
            log::info!(
                "Tier2 unavailable ({}); host monitor support: {}",
                reason,
                monitor::describe_support()
            );
        }
        let capabilities = CapabilityReport {
            runtime: runtime_status,
            tier1_executor: tier1.name().to_string(),
            tier2: tier2.status(),
            monitor: tier2.as_ref().map(|t| t.mechanism().to_string()),
            seccomp: seccomp::get_seccomp_status(),
            namespaces: tier2
                .as_ref()
                .map(|t| t.namespaces().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            running_as_root: Uid::effective().is_root(),
        };
        log::info!(
            "Orchestrator ready: tier1={}, tier2={}",
            capabilities.tier1_executor,
            capabilities.tier2
        );

        Ok(Self {
            engine: VerdictEngine::new(config.verdict.clone()),
            config: Arc::new(config),
            tier1,
            tier2,
            stats: OrchestratorStats::new(),
            capabilities,
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &CapabilityReport {
        &self.capabilities
    }

    pub fn get_statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn tier2_available(&self) -> bool {
        self.tier2.is_available()
    }

    /// Analyze one file
    ///
    /// Returns a verdict, or an error only when the host could not provide
    /// the resources for this analysis (see `SandboxError::is_fatal_to_analysis`).
    pub fn analyze(&self, bytes: &[u8], filename: &str, timeout: Duration) -> Result<Verdict> {
        let started = Instant::now();
        let request = AnalysisRequest::new(bytes, filename, timeout, Arc::clone(&self.config));
        let analysis_id = request.id().to_string();
        audit::emit(&AuditEvent::AnalysisStarted {
            analysis_id: analysis_id.clone(),
            filename: filename.to_string(),
            size: bytes.len(),
            fingerprint: request.fingerprint().to_string(),
        });

        let mut sample = AnalysisSample::default();
        let result = self.run_tiers(&request, started, &mut sample);
        sample.latency = started.elapsed();

        match &result {
            Ok(verdict) => {
                sample.classification = Some(verdict.classification);
                log::info!(
                    "{}: {} (confidence {:.2}) in {:?}",
                    filename,
                    verdict.classification,
                    verdict.confidence,
                    sample.latency
                );
                audit::emit(&AuditEvent::AnalysisFinished {
                    analysis_id,
                    classification: verdict.classification.to_string(),
                    confidence: verdict.confidence,
                    decision_path: format!("{:?}", verdict.decision_path),
                    latency_ms: sample.latency.as_millis() as u64,
                });
            }
            Err(e) => {
                sample.errored = true;
                log::error!("{}: analysis failed: {}", filename, e);
                audit::emit(&AuditEvent::AnalysisFailed {
                    analysis_id,
                    error: e.to_string(),
                });
            }
        }

        self.stats.record(&sample);
        result
    }

    fn run_tiers(&self, request: &AnalysisRequest, started: Instant, sample: &mut AnalysisSample) -> Result<Verdict> {
        let tier1 = self.run_tier1(request, sample)?;

        let outcome = match self.engine.escalation(tier1.as_ref()) {
            Escalation::Skip => Tier2Outcome::Skipped,
            Escalation::Escalate(reason) => {
                log::debug!("Escalating {}: {}", request.id(), reason);
                self.run_tier2(request, started, sample)?
            }
        };

        match &outcome {
            Tier2Outcome::Ran(report) => {
                sample.tier2_ran = true;
                sample.timed_out |= report.metrics.timed_out;
            }
            _ => sample.tier2_skipped = true,
        }

        Ok(self
            .engine
            .decide(request.fingerprint(), tier1.as_ref(), outcome.status()))
    }

    fn run_tier1(&self, request: &AnalysisRequest, sample: &mut AnalysisSample) -> Result<Option<Tier1Result>> {
        let budget = self.config.tier1_time_slice().min(request.timeout());
        sample.tier1_ran = true;

        match self.tier1.execute(request, budget) {
            Ok(result) => {
                sample.tier1_degraded = result.degraded;
                sample.timed_out |= result.timed_out;
                if result.degraded && self.config.tier1_module.is_some() {
                    audit::emit(&AuditEvent::TierDegraded {
                        analysis_id: request.id().to_string(),
                        tier: 1,
                        reason: result.findings.last().cloned().unwrap_or_default(),
                    });
                }
                Ok(Some(result))
            }
            Err(e) if e.is_fatal_to_analysis() => Err(e),
            Err(e) => {
                log::warn!("Tier1 produced no signal: {}", e);
                sample.tier1_degraded = true;
                sample.timed_out |= e.is_timeout();
                audit::emit(&AuditEvent::TierDegraded {
                    analysis_id: request.id().to_string(),
                    tier: 1,
                    reason: e.to_string(),
                });
                Ok(None)
            }
        }
    }

    fn run_tier2(&self, request: &AnalysisRequest, started: Instant, sample: &mut AnalysisSample) -> Result<Tier2Outcome> {
        let sandbox = match &self.tier2 {
            Capability::Available(sandbox) => sandbox,
            Capability::Unavailable { reason } => return Ok(Tier2Outcome::Unavailable(reason.clone())),
        };
        if !Tier2Sandbox::is_applicable(request.content()) {
            return Ok(Tier2Outcome::NotApplicable);
        }

        let remaining = request.timeout().saturating_sub(started.elapsed());
        if remaining < Duration::from_millis(self.config.tier2_min_budget_ms) {
            log::debug!("Only {:?} left for Tier2; not starting it", remaining);
            return Ok(Tier2Outcome::OutOfTime);
        }

        match sandbox.run(request, remaining) {
            Ok(report) => Ok(Tier2Outcome::Ran(Box::new(report))),
            Err(e) if e.is_fatal_to_analysis() => Err(e),
            Err(e) => {
                log::warn!("Tier2 produced no signal: {}", e);
                sample.timed_out |= e.is_timeout();
                audit::emit(&AuditEvent::TierDegraded {
                    analysis_id: request.id().to_string(),
                    tier: 2,
                    reason: e.to_string(),
                });
                Ok(Tier2Outcome::Failed(e.to_string()))
            }
        }
    }
}

/// Module executor when one is configured and loads, heuristic otherwise
fn select_tier1(runtime: Capability<ResourceLimitedRuntime>, config: &SandboxConfig) -> Result<Box<dyn TierExecutor>> {
    let Some(path) = config.tier1_module.as_deref() else {
        log::info!("No Tier1 module configured; using the built-in heuristic");
        return Ok(Box::new(HeuristicExecutor::new()));
    };

    let runtime = match runtime {
        Capability::Available(runtime) => runtime,
        Capability::Unavailable { reason } => {
            log::warn!("Tier1 module {} cannot run: {}", path.display(), reason);
            return Ok(Box::new(HeuristicExecutor::new()));
        }
    };

    match WasmTier1Executor::from_file(runtime, path) {
        Ok(executor) => Ok(Box::new(FallbackExecutor::new(executor))),
        Err(e) if config.strict_mode => Err(e),
        Err(e) => {
            log::warn!("Tier1 module rejected, using the built-in heuristic: {}", e);
            Ok(Box::new(HeuristicExecutor::new()))
        }
    }
}
