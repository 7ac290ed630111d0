// Orchestrator statistics
//
// Process-wide counters shared by every analysis. Created with the
// orchestrator, mutated only through `OrchestratorStats::record`, read
// through snapshots. Updates are relaxed atomics and never block an analysis.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::verdict::Classification;

/// Counter metric (monotonically increasing)
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge metric
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Raise to `value` if larger
    pub fn set_max(&self, value: u64) {
        self.value.fetch_max(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct HistogramBucket {
    pub le: f64, // upper bound in seconds
    pub count: AtomicU64,
}

/// Cumulative latency histogram
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum: AtomicU64, // microseconds
    count: AtomicU64,
}

impl Histogram {
    pub fn new_latency() -> Self {
        let bucket_bounds = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];
        Self {
            buckets: bucket_bounds
                .into_iter()
                .map(|le| HistogramBucket {
                    le,
                    count: AtomicU64::new(0),
                })
                .collect(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let seconds = value.as_secs_f64();
        self.sum.fetch_add(value.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for bucket in &self.buckets {
            if seconds <= bucket.le {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .map(|b| (b.le, b.count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// What one analysis contributes to the statistics
#[derive(Debug, Clone, Default)]
pub struct AnalysisSample {
    pub latency: Duration,
    pub timed_out: bool,
    pub errored: bool,
    pub tier1_ran: bool,
    pub tier1_degraded: bool,
    pub tier2_ran: bool,
    pub tier2_skipped: bool,
    /// None when the analysis failed without a verdict
    pub classification: Option<Classification>,
}

#[derive(Debug)]
pub struct OrchestratorStats {
    executions: Counter,
    timeouts: Counter,
    errors: Counter,
    total_latency_us: Counter,
    max_latency_us: Gauge,
    tier1_runs: Counter,
    tier1_degraded: Counter,
    tier2_runs: Counter,
    tier2_skipped: Counter,
    verdicts_clean: Counter,
    verdicts_suspicious: Counter,
    verdicts_malicious: Counter,
    latency: Histogram,
}

impl Default for OrchestratorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorStats {
    pub fn new() -> Self {
        Self {
            executions: Counter::new(),
            timeouts: Counter::new(),
            errors: Counter::new(),
            total_latency_us: Counter::new(),
            max_latency_us: Gauge::new(),
            tier1_runs: Counter::new(),
            tier1_degraded: Counter::new(),
            tier2_runs: Counter::new(),
            tier2_skipped: Counter::new(),
            verdicts_clean: Counter::new(),
            verdicts_suspicious: Counter::new(),
            verdicts_malicious: Counter::new(),
            latency: Histogram::new_latency(),
        }
    }

    /// The single update path, called once per analysis
    pub fn record(&self, sample: &AnalysisSample) {
        let micros = sample.latency.as_micros() as u64;
        self.executions.inc();
        self.total_latency_us.add(micros);
        self.max_latency_us.set_max(micros);
        self.latency.observe(sample.latency);

        if sample.timed_out {
            self.timeouts.inc();
        }
        if sample.errored {
            self.errors.inc();
        }
        if sample.tier1_ran {
            self.tier1_runs.inc();
        }
        if sample.tier1_degraded {
            self.tier1_degraded.inc();
        }
        if sample.tier2_ran {
            self.tier2_runs.inc();
        }
        if sample.tier2_skipped {
            self.tier2_skipped.inc();
        }
        match sample.classification {
            Some(Classification::Clean) => self.verdicts_clean.inc(),
            Some(Classification::Suspicious) => self.verdicts_suspicious.inc(),
            Some(Classification::Malicious) => self.verdicts_malicious.inc(),
            None => {}
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let executions = self.executions.get();
        let total_latency_us = self.total_latency_us.get();
        StatsSnapshot {
            executions,
            timeouts: self.timeouts.get(),
            errors: self.errors.get(),
            total_latency_ms: total_latency_us / 1000,
            average_latency_ms: if executions == 0 {
                0.0
            } else {
                total_latency_us as f64 / executions as f64 / 1000.0
            },
            max_latency_ms: self.max_latency_us.get() / 1000,
            tier1_runs: self.tier1_runs.get(),
            tier1_degraded: self.tier1_degraded.get(),
            tier2_runs: self.tier2_runs.get(),
            tier2_skipped: self.tier2_skipped.get(),
            verdicts_clean: self.verdicts_clean.get(),
            verdicts_suspicious: self.verdicts_suspicious.get(),
            verdicts_malicious: self.verdicts_malicious.get(),
            latency_buckets: self.latency.buckets(),
        }
    }
}

/// Point-in-time copy of the statistics
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub executions: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
    pub average_latency_ms: f64,
    pub max_latency_ms: u64,
    pub tier1_runs: u64,
    pub tier1_degraded: u64,
    pub tier2_runs: u64,
    pub tier2_skipped: u64,
    pub verdicts_clean: u64,
    pub verdicts_suspicious: u64,
    pub verdicts_malicious: u64,
    /// (upper bound seconds, cumulative count)
    pub latency_buckets: Vec<(f64, u64)>,
}
