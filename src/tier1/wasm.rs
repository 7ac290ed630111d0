// Module-backed Tier1 executor
// Runs the fixed ABI inside the resource-limited runtime. Every analysis
// gets its own instantiation; input and result buffers are released on all
// paths.

use crate::config::types::{Result, SandboxError};
use crate::core::types::AnalysisRequest;
use crate::runtime::wasm::{LoadedModule, ModuleInstance, ResourceLimitedRuntime};
use crate::tier1::abi::{self, ResultRecord};
use crate::tier1::heuristic::HeuristicExecutor;
use crate::tier1::{Tier1Result, Tier1Source, TierExecutor};
use std::path::Path;
use std::time::{Duration, Instant};

/// Fuel granted to deallocate calls after the main call exhausted its budget
const CLEANUP_FUEL: u64 = 1_000_000;
/// Wall-clock budget for each bookkeeping call (version, allocate, deallocate)
const BOOKKEEPING_BUDGET: Duration = Duration::from_millis(100);

pub struct WasmTier1Executor {
    runtime: ResourceLimitedRuntime,
    module: LoadedModule,
    version: u32,
}

impl WasmTier1Executor {
    /// Load, validate, and version-check a module file
    pub fn from_file(runtime: ResourceLimitedRuntime, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            SandboxError::ModuleLoad(format!("failed to read module {}: {}", path.display(), e))
        })?;
        Self::from_bytes(runtime, &bytes)
    }

    pub fn from_bytes(runtime: ResourceLimitedRuntime, bytes: &[u8]) -> Result<Self> {
        let module = runtime.load_module(bytes)?;

        for name in abi::REQUIRED_FUNCTIONS {
            if !module.exports_function(name) {
                return Err(SandboxError::ModuleLoad(format!(
                    "module does not export '{}'",
                    name
                )));
            }
        }

        // Instantiate once up front so a broken module is rejected at load
        let mut probe = runtime.instantiate(&module)?;
        let version: i32 = probe.call(abi::EXPORT_VERSION, (), BOOKKEEPING_BUDGET)?;
        if version != abi::ABI_VERSION {
            return Err(SandboxError::ModuleLoad(format!(
                "module ABI version {} is not supported (expected {})",
                version,
                abi::ABI_VERSION
            )));
        }

        log::info!(
            "Loaded Tier1 module {} (ABI v{})",
            &module.fingerprint()[..12],
            version
        );

        Ok(Self {
            runtime,
            module,
            version: version as u32,
        })
    }

    pub fn module_fingerprint(&self) -> &str {
        self.module.fingerprint()
    }

    fn analyze(&self, content: &[u8], budget: Duration) -> Result<Tier1Result> {
        let started = Instant::now();
        let mut instance = self.runtime.instantiate(&self.module)?;

        let len = i32::try_from(content.len()).map_err(|_| {
            SandboxError::AllocationFailure(format!(
                "{} bytes exceeds the 32-bit guest address space",
                content.len()
            ))
        })?;

        let input_ptr: i32 = instance.call(abi::EXPORT_ALLOCATE, len, BOOKKEEPING_BUDGET)?;
        if input_ptr == 0 {
            return Err(SandboxError::AllocationFailure(format!(
                "module could not allocate {} bytes",
                content.len()
            )));
        }

        let outcome = run_analysis(&mut instance, input_ptr, content, budget);

        // always release the input buffer, even after a trap
        release(&mut instance, input_ptr, len);

        let record = outcome?;
        if record.is_error() {
            return Err(SandboxError::ResultDecode(format!(
                "module reported error code {}",
                record.error_code
            )));
        }

        log::debug!(
            "Tier1 module finished in {:?}, fuel left {}",
            started.elapsed(),
            instance.fuel_remaining()
        );

        Ok(Tier1Result {
            pattern_score: record.pattern_score,
            ml_score: record.ml_score,
            detected_pattern_count: record.detected_pattern_count,
            execution_time_us: record.execution_time_us,
            error_code: record.error_code,
            timed_out: false,
            degraded: false,
            source: Tier1Source::Module {
                version: self.version,
                fingerprint: self.module.fingerprint().to_string(),
            },
            findings: Vec::new(),
        })
    }
}

fn run_analysis(
    instance: &mut ModuleInstance,
    input_ptr: i32,
    content: &[u8],
    budget: Duration,
) -> Result<ResultRecord> {
    let len = content.len() as i32;
    instance.write_memory(input_ptr, content)?;

    let result_ptr: i32 = instance.call(abi::EXPORT_ANALYZE, (input_ptr, len), budget)?;
    if result_ptr == 0 {
        return Err(SandboxError::ResultDecode(
            "analyze_file returned a null result pointer".to_string(),
        ));
    }

    // a record that does not fit in memory was never allocated; nothing to release
    let record = instance.read_memory(result_ptr, abi::RESULT_RECORD_LEN)?.to_vec();
    release(instance, result_ptr, abi::RESULT_RECORD_LEN as i32);
    ResultRecord::decode(&record)
}

fn release(instance: &mut ModuleInstance, ptr: i32, len: i32) {
    if instance.fuel_remaining() < CLEANUP_FUEL {
        if let Err(e) = instance.refuel(CLEANUP_FUEL) {
            log::debug!("could not refuel for cleanup: {}", e);
        }
    }
    if let Err(e) = instance.call::<(i32, i32), ()>(abi::EXPORT_DEALLOCATE, (ptr, len), BOOKKEEPING_BUDGET) {
        log::debug!("deallocate({}, {}) failed: {}", ptr, len, e);
    }
}

impl TierExecutor for WasmTier1Executor {
    fn name(&self) -> &'static str {
        "wasm-module"
    }

    fn execute(&self, request: &AnalysisRequest, budget: Duration) -> Result<Tier1Result> {
        self.analyze(request.content(), budget)
    }
}

/// Module executor with the heuristic behind it for per-call failures
pub struct FallbackExecutor {
    primary: WasmTier1Executor,
    fallback: HeuristicExecutor,
}

impl FallbackExecutor {
    pub fn new(primary: WasmTier1Executor) -> Self {
        Self {
            primary,
            fallback: HeuristicExecutor::new(),
        }
    }

    pub fn primary(&self) -> &WasmTier1Executor {
        &self.primary
    }
}

impl TierExecutor for FallbackExecutor {
    fn name(&self) -> &'static str {
        "wasm-module+heuristic"
    }

    fn execute(&self, request: &AnalysisRequest, budget: Duration) -> Result<Tier1Result> {
        match self.primary.execute(request, budget) {
            Ok(result) => Ok(result),
            Err(e) => {
                log::warn!("Tier1 module failed, using heuristic: {}", e);
                let mut result = self.fallback.execute(request, budget)?;
                result.timed_out = e.is_timeout();
                result.findings.push(format!("Module failure: {}", e));
                Ok(result)
            }
        }
    }
}
