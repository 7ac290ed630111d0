//! sentinel-sandbox: multi-tier analysis of untrusted downloads
//!
//! Every file passes a fast static tier; ambiguous results escalate to a
//! dynamic tier that runs the candidate under kernel-enforced isolation and
//! folds what it does into behavioral metrics. A verdict engine fuses the two.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::seccomp`]: seccomp-BPF program construction and support probe
//! - [`kernel::syscalls`]: x86_64 syscall table with behavioral categories
//! - [`kernel::namespace`]: namespace selection and probe
//!
//! ## Tier1 ([`runtime`], [`tier1`])
//! - [`runtime::wasm`]: WASM engine with fuel, epoch deadline and memory ceiling
//! - [`tier1::abi`]: fixed module ABI and result record decoding
//! - [`tier1::heuristic`]: in-process fallback when no module can run
//!
//! ## Tier2 ([`exec`], [`monitor`], [`crate::core::supervisor`])
//! - [`exec::preexec`]: type-state ordered child setup before exec
//! - [`monitor::tracer`]: ptrace syscall monitor with seccomp trace events
//! - [`crate::core::supervisor`]: run state machine, watchdog kill, reap-exactly-once
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::behavior`]: behavioral metrics and threat scoring
//! - [`verdict::abuse`]: behavior pattern detectors
//! - [`verdict::verdict`]: escalation and fusion
//!
//! ## Support
//! - [`safety::workspace`]: owner-only scratch directory per analysis
//! - [`observability`]: audit events and orchestrator statistics
//! - [`config`]: configuration, error taxonomy, presets, validation
//!
//! # Usage
//!
//! ```no_run
//! use sentinel_sandbox::{Orchestrator, SandboxConfig};
//! use std::time::Duration;
//!
//! let orchestrator = Orchestrator::new(SandboxConfig::default())?;
//! let verdict = orchestrator.analyze(b"#!/bin/sh\necho hi\n", "hi.sh", Duration::from_secs(5))?;
//! println!("{} ({:.2})", verdict.classification, verdict.confidence);
//! # Ok::<(), sentinel_sandbox::SandboxError>(())
//! ```

// Configuration & Policy
pub mod config;

// Kernel Primitives
pub mod kernel;

// Tier1
pub mod runtime;
pub mod tier1;

// Tier2
pub mod exec;
pub mod monitor;

// Orchestration
pub mod core;

// Evidence & Verdict
pub mod verdict;

// Safety & Cleanup
pub mod safety;

// Observability
pub mod observability;

// CLI entrypoint wiring for the sentinel binary
pub mod cli;

pub use config::types::{Result, SandboxConfig, SandboxError};
pub use crate::core::types::{Capability, CapabilityReport};
pub use crate::core::Orchestrator;
pub use observability::StatsSnapshot;
pub use verdict::{BehavioralMetrics, Classification, DecisionPath, Verdict};
