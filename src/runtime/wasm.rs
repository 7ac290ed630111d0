// Resource-limited WebAssembly runtime for Tier1 analysis modules
//
// Three independent ceilings apply to every call:
// - fuel: instruction budget, set per instantiation
// - epoch deadline: wall clock, driven by a background ticker
// - linear memory: StoreLimits ceiling, grow requests past it return -1

use crate::config::types::{Result, SandboxConfig, SandboxError};
use crate::core::types::{sha256_hex, Capability};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use wasmtime::{
    Caller, Config, Engine, ExternType, Instance, Linker, Memory, Module, Store, StoreLimits,
    StoreLimitsBuilder, Trap, WasmParams, WasmResults,
};

/// Resolution of the epoch watchdog
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

const WASM_PAGE_SIZE: u64 = 64 * 1024;
const MAX_LOG_LINES: u32 = 64;
const MAX_LOG_BYTES: usize = 1024;

/// Smallest valid module; compiled once to prove the engine works on this host
const EMPTY_MODULE: &[u8] = b"\0asm\x01\0\0\0";

/// Limits applied to every instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub memory_bytes: u64,
    pub fuel: u64,
}

/// Background thread advancing the engine epoch every `EPOCH_TICK`
struct EpochTicker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    fn start(engine: Engine) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("sentinel-epoch".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(EPOCH_TICK) {
                    Err(RecvTimeoutError::Timeout) => engine.increment_epoch(),
                    _ => break,
                }
            })?;
        Ok(Self {
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        // closing the channel stops the loop
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sandboxed execution environment for untrusted analysis modules
pub struct ResourceLimitedRuntime {
    engine: Engine,
    limits: RuntimeLimits,
    _ticker: EpochTicker,
}

impl std::fmt::Debug for ResourceLimitedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLimitedRuntime")
            .field("limits", &self.limits)
            .finish()
    }
}

impl ResourceLimitedRuntime {
    /// Probe for a working engine; never fails hard
    pub fn probe(config: &SandboxConfig) -> Capability<Self> {
        let limits = RuntimeLimits {
            memory_bytes: config.memory_limit_bytes,
            fuel: config.fuel_budget,
        };
        match Self::create(limits) {
            Ok(runtime) => Capability::Available(runtime),
            Err(e) => {
                log::warn!("wasm runtime unavailable: {}", e);
                Capability::unavailable(e.to_string())
            }
        }
    }

    pub fn create(limits: RuntimeLimits) -> Result<Self> {
        let mut wasm_config = Config::new();
        wasm_config.consume_fuel(true);
        wasm_config.epoch_interruption(true);

        let engine = Engine::new(&wasm_config).map_err(|e| {
            SandboxError::CapabilityUnavailable(format!("failed to initialize wasm engine: {}", e))
        })?;
        Module::from_binary(&engine, EMPTY_MODULE).map_err(|e| {
            SandboxError::CapabilityUnavailable(format!("wasm engine cannot compile modules: {}", e))
        })?;

        let ticker = EpochTicker::start(engine.clone()).map_err(|e| {
            SandboxError::CapabilityUnavailable(format!("failed to start epoch watchdog: {}", e))
        })?;

        log::debug!(
            "wasm runtime ready: memory ceiling {} bytes, fuel {}",
            limits.memory_bytes,
            limits.fuel
        );

        Ok(Self {
            engine,
            limits,
            _ticker: ticker,
        })
    }

    pub fn limits(&self) -> RuntimeLimits {
        self.limits
    }

    /// Compile and validate a module against the memory ceiling
    pub fn load_module(&self, bytes: &[u8]) -> Result<LoadedModule> {
        let module = Module::from_binary(&self.engine, bytes)
            .map_err(|e| SandboxError::ModuleLoad(format!("failed to compile wasm module: {}", e)))?;

        for import in module.imports() {
            if let ExternType::Memory(_) = import.ty() {
                return Err(SandboxError::ModuleLoad(format!(
                    "module imports memory {}.{}, it must define its own",
                    import.module(),
                    import.name()
                )));
            }
        }

        for export in module.exports() {
            if let ExternType::Memory(memory) = export.ty() {
                let initial = memory.minimum().saturating_mul(WASM_PAGE_SIZE);
                if initial > self.limits.memory_bytes {
                    return Err(SandboxError::ModuleLoad(format!(
                        "memory '{}' declares {} initial bytes, ceiling is {}",
                        export.name(),
                        initial,
                        self.limits.memory_bytes
                    )));
                }
                if let Some(max) = memory.maximum() {
                    if max.saturating_mul(WASM_PAGE_SIZE) > self.limits.memory_bytes {
                        log::debug!(
                            "memory '{}' may grow to {} pages, growth past the ceiling will be refused",
                            export.name(),
                            max
                        );
                    }
                }
            }
        }

        Ok(LoadedModule {
            module,
            fingerprint: sha256_hex(bytes),
        })
    }

    /// Fresh instance with its own store, fuel, and memory ceiling
    pub fn instantiate(&self, module: &LoadedModule) -> Result<ModuleInstance> {
        let memory_limit = usize::try_from(self.limits.memory_bytes).unwrap_or(usize::MAX);
        let state = HostState {
            limits: StoreLimitsBuilder::new()
                .memory_size(memory_limit)
                .instances(1)
                .memories(1)
                .build(),
            log_lines: 0,
            started: Instant::now(),
        };

        let mut store = Store::new(&self.engine, state);
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(self.limits.fuel)
            .map_err(|e| SandboxError::ModuleLoad(format!("failed to set wasm fuel: {}", e)))?;
        // nothing runs until call() arms a real deadline
        store.set_epoch_deadline(1);

        let linker = host_linker(&self.engine)?;
        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| classify_instantiate_error(e, self.limits.memory_bytes))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| SandboxError::ModuleLoad("module must export 'memory'".to_string()))?;

        Ok(ModuleInstance {
            store,
            instance,
            memory,
        })
    }
}

/// Compiled module, shareable between analyses; each analysis instantiates it
#[derive(Clone, Debug)]
pub struct LoadedModule {
    module: Module,
    fingerprint: String,
}

impl LoadedModule {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn exports_function(&self, name: &str) -> bool {
        self.module
            .exports()
            .any(|e| e.name() == name && matches!(e.ty(), ExternType::Func(_)))
    }
}

struct HostState {
    limits: StoreLimits,
    log_lines: u32,
    started: Instant,
}

fn host_linker(engine: &Engine) -> Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| {
                if caller.data().log_lines >= MAX_LOG_LINES {
                    return;
                }
                caller.data_mut().log_lines += 1;

                let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
                    return;
                };
                let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
                    return;
                };
                let data = memory.data(&caller);
                let Some(end) = start.checked_add(len.min(MAX_LOG_BYTES)) else {
                    return;
                };
                let Some(bytes) = data.get(start..end) else {
                    return;
                };
                let text = String::from_utf8_lossy(bytes);
                let level = match level {
                    0 => log::Level::Error,
                    1 => log::Level::Warn,
                    2 => log::Level::Info,
                    3 => log::Level::Debug,
                    _ => log::Level::Trace,
                };
                log::log!(target: "sentinel::module", level, "{}", text);
            },
        )
        .map_err(|e| SandboxError::ModuleLoad(format!("failed to bind env.log: {}", e)))?;

    linker
        .func_wrap(
            "env",
            "current_time_ms",
            |caller: Caller<'_, HostState>| -> i64 {
                i64::try_from(caller.data().started.elapsed().as_millis()).unwrap_or(i64::MAX)
            },
        )
        .map_err(|e| SandboxError::ModuleLoad(format!("failed to bind env.current_time_ms: {}", e)))?;

    Ok(linker)
}

fn classify_instantiate_error(err: wasmtime::Error, memory_limit: u64) -> SandboxError {
    if let Some(trap) = err.downcast_ref::<Trap>() {
        return SandboxError::ExecutionTrap(format!("start function trapped: {}", trap));
    }
    let text = err.to_string();
    if text.contains("memory") && text.contains("limit") {
        return SandboxError::ModuleLoad(format!(
            "instance memory exceeds ceiling of {} bytes: {}",
            memory_limit, text
        ));
    }
    SandboxError::ModuleLoad(format!("failed to instantiate module: {}", text))
}

/// Map a failed call onto the error taxonomy
fn classify_call_error(err: wasmtime::Error, name: &str, budget: Duration) -> SandboxError {
    match err.downcast_ref::<Trap>() {
        Some(Trap::Interrupt) => SandboxError::Timeout(budget),
        Some(Trap::OutOfFuel) => {
            SandboxError::ExecutionTrap(format!("{} exhausted its fuel budget", name))
        }
        Some(trap) => SandboxError::ExecutionTrap(format!("{} trapped: {}", name, trap)),
        None => SandboxError::ExecutionTrap(format!("{} failed: {}", name, err)),
    }
}

/// Ticks needed to cover `budget`; one extra because the current tick is partly spent
fn deadline_ticks(budget: Duration) -> u64 {
    let tick = EPOCH_TICK.as_nanos().max(1);
    let ticks = budget.as_nanos().div_ceil(tick);
    u64::try_from(ticks).unwrap_or(u64::MAX - 1).max(1) + 1
}

/// One instantiation of a module: its store, memory, and exports
pub struct ModuleInstance {
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
}

impl ModuleInstance {
    /// Call an export under the wall-clock budget
    pub fn call<P, R>(&mut self, name: &str, params: P, budget: Duration) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self
            .instance
            .get_typed_func::<P, R>(&mut self.store, name)
            .map_err(|e| SandboxError::ModuleLoad(format!("export '{}' unusable: {}", name, e)))?;

        self.store.set_epoch_deadline(deadline_ticks(budget));
        func.call(&mut self.store, params)
            .map_err(|e| classify_call_error(e, name, budget))
    }

    /// Copy bytes into linear memory with bounds checks
    pub fn write_memory(&mut self, offset: i32, bytes: &[u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| {
            SandboxError::AllocationFailure(format!("negative guest pointer {}", offset))
        })?;
        let end = start.checked_add(bytes.len()).ok_or_else(|| {
            SandboxError::AllocationFailure("guest pointer overflow".to_string())
        })?;
        let size = self.memory.data_size(&self.store);
        if end > size {
            return Err(SandboxError::AllocationFailure(format!(
                "write [{}, {}) exceeds memory size {}",
                start, end, size
            )));
        }
        self.memory
            .write(&mut self.store, start, bytes)
            .map_err(|e| SandboxError::AllocationFailure(format!("memory write failed: {}", e)))
    }

    /// Borrow `len` bytes of linear memory starting at `offset`
    pub fn read_memory(&self, offset: i32, len: usize) -> Result<&[u8]> {
        let start = usize::try_from(offset)
            .map_err(|_| SandboxError::ResultDecode(format!("negative guest pointer {}", offset)))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| SandboxError::ResultDecode("guest pointer overflow".to_string()))?;
        let data = self.memory.data(&self.store);
        data.get(start..end).ok_or_else(|| {
            SandboxError::ResultDecode(format!(
                "read [{}, {}) exceeds memory size {}",
                start,
                end,
                data.len()
            ))
        })
    }

    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    pub fn fuel_remaining(&self) -> u64 {
        self.store.get_fuel().unwrap_or(0)
    }

    /// Top up fuel so cleanup calls can still run after exhaustion
    pub fn refuel(&mut self, fuel: u64) -> Result<()> {
        self.store
            .set_fuel(fuel)
            .map_err(|e| SandboxError::ExecutionTrap(format!("failed to set wasm fuel: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_ticks_cover_budget() {
        assert_eq!(deadline_ticks(Duration::ZERO), 2);
        assert_eq!(deadline_ticks(Duration::from_millis(10)), 2);
        assert_eq!(deadline_ticks(Duration::from_millis(11)), 3);
        assert_eq!(deadline_ticks(Duration::from_secs(1)), 101);
    }

    #[test]
    fn test_probe_reports_limits() {
        let config = SandboxConfig::default();
        match ResourceLimitedRuntime::probe(&config) {
            Capability::Available(runtime) => {
                assert_eq!(runtime.limits().memory_bytes, config.memory_limit_bytes);
                assert_eq!(runtime.limits().fuel, config.fuel_budget);
            }
            Capability::Unavailable { reason } => {
                assert!(!reason.is_empty());
            }
        }
    }

    #[test]
    fn test_garbage_bytes_are_a_load_error() {
        let Some(runtime) = ResourceLimitedRuntime::probe(&SandboxConfig::default()).into_option() else {
            return;
        };
        let err = runtime.load_module(b"definitely not wasm").unwrap_err();
        assert!(matches!(err, SandboxError::ModuleLoad(_)));
    }
}
