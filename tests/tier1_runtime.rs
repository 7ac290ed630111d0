/// Tier1 runtime and module ABI integration tests
///
/// Modules are assembled from WAT at test time. Each test builds its own
/// runtime so limits can differ per case.
use sentinel_sandbox::core::types::AnalysisRequest;
use sentinel_sandbox::runtime::{ResourceLimitedRuntime, RuntimeLimits};
use sentinel_sandbox::tier1::{FallbackExecutor, Tier1Source, TierExecutor, WasmTier1Executor};
use sentinel_sandbox::{SandboxConfig, SandboxError};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_FUEL: u64 = 50_000_000;
const ONE_MIB: u64 = 1024 * 1024;

/// Writes a well-formed record at offset 64 and returns it
const GOOD_ANALYZE: &str = r#"
    (f32.store (i32.const 64) (f32.const 0.9))
    (f32.store (i32.const 68) (f32.const 0.8))
    (i32.store (i32.const 72) (i32.const 2))
    (i64.store (i32.const 76) (i64.const 1500))
    (i32.store (i32.const 84) (i32.const 0))
    (i32.const 64)
"#;

const BUMP_ALLOCATE: &str = r#"
    (local $p i32)
    (local.set $p (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $p)
"#;

fn module(version: i32, allocate: &str, analyze: &str, deallocate: &str) -> Vec<u8> {
    let text = format!(
        r#"
        (module
          (memory (export "memory") 1)
          (global $next (mut i32) (i32.const 1024))
          (func (export "get_version") (result i32) (i32.const {version}))
          (func (export "allocate") (param $size i32) (result i32) {allocate})
          (func (export "deallocate") (param i32 i32) {deallocate})
          (func (export "analyze_file") (param $ptr i32) (param $len i32) (result i32) {analyze})
        )
        "#
    );
    wat::parse_str(text).unwrap()
}

fn good_module() -> Vec<u8> {
    module(1, BUMP_ALLOCATE, GOOD_ANALYZE, "")
}

fn runtime(memory_bytes: u64, fuel: u64) -> ResourceLimitedRuntime {
    ResourceLimitedRuntime::create(RuntimeLimits { memory_bytes, fuel }).unwrap()
}

fn request(content: &[u8]) -> AnalysisRequest {
    AnalysisRequest::new(
        content,
        "sample.bin",
        Duration::from_secs(1),
        Arc::new(SandboxConfig::default()),
    )
}

#[test]
fn test_abi_round_trip_decodes_record() {
    let executor = WasmTier1Executor::from_bytes(runtime(16 * ONE_MIB, DEFAULT_FUEL), &good_module()).unwrap();
    let result = executor.execute(&request(b"hello"), Duration::from_secs(1)).unwrap();

    assert_eq!(result.pattern_score, 0.9);
    assert_eq!(result.ml_score, 0.8);
    assert_eq!(result.detected_pattern_count, 2);
    assert_eq!(result.execution_time_us, 1500);
    assert!(!result.degraded);
    assert!(!result.timed_out);
    match result.source {
        Tier1Source::Module { version, fingerprint } => {
            assert_eq!(version, 1);
            assert_eq!(fingerprint, executor.module_fingerprint());
        }
        other => panic!("unexpected source {:?}", other),
    }
}

#[test]
fn test_each_analysis_gets_a_fresh_instance() {
    // allocate bumps a global; a shared instance would hand out growing pointers
    // until the page runs out
    let executor = WasmTier1Executor::from_bytes(runtime(16 * ONE_MIB, DEFAULT_FUEL), &good_module()).unwrap();
    let content = vec![0x41u8; 40 * 1024];
    for _ in 0..8 {
        executor.execute(&request(&content), Duration::from_secs(1)).unwrap();
    }
}

#[test]
fn test_infinite_loop_exhausts_fuel() {
    let wasm = module(1, BUMP_ALLOCATE, "(loop $spin (br $spin)) (i32.const 0)", "");
    let executor = WasmTier1Executor::from_bytes(runtime(16 * ONE_MIB, 100_000), &wasm).unwrap();

    let err = executor.execute(&request(b"x"), Duration::from_secs(5)).unwrap_err();
    match err {
        SandboxError::ExecutionTrap(msg) => assert!(msg.contains("fuel"), "{}", msg),
        other => panic!("expected fuel trap, got {:?}", other),
    }
}

#[test]
fn test_epoch_deadline_interrupts_long_call() {
    let wasm = module(1, BUMP_ALLOCATE, "(loop $spin (br $spin)) (i32.const 0)", "");
    let executor = WasmTier1Executor::from_bytes(runtime(16 * ONE_MIB, u64::MAX / 2), &wasm).unwrap();

    let started = Instant::now();
    let err = executor.execute(&request(b"x"), Duration::from_millis(50)).unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_memory_grow_past_ceiling_is_refused() {
    // record the memory.grow result in detected_pattern_count
    let analyze = r#"
        (f32.store (i32.const 64) (f32.const 0.0))
        (f32.store (i32.const 68) (f32.const 0.0))
        (i32.store (i32.const 72) (memory.grow (i32.const 16)))
        (i64.store (i32.const 76) (i64.const 0))
        (i32.store (i32.const 84) (i32.const 0))
        (i32.const 64)
    "#;
    let wasm = module(1, BUMP_ALLOCATE, analyze, "");
    let executor = WasmTier1Executor::from_bytes(runtime(128 * 1024, DEFAULT_FUEL), &wasm).unwrap();

    let result = executor.execute(&request(b"x"), Duration::from_secs(1)).unwrap();
    assert_eq!(result.detected_pattern_count, u32::MAX, "grow should return -1");
}

#[test]
fn test_initial_memory_above_ceiling_is_rejected() {
    let wasm = wat::parse_str(r#"(module (memory (export "memory") 32))"#).unwrap();
    let runtime = runtime(ONE_MIB, DEFAULT_FUEL);
    let err = runtime.load_module(&wasm).err().unwrap();
    assert!(matches!(err, SandboxError::ModuleLoad(_)), "{:?}", err);
}

#[test]
fn test_malformed_module_is_rejected() {
    let err = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), b"definitely not wasm")
        .err()
        .unwrap();
    assert!(matches!(err, SandboxError::ModuleLoad(_)), "{:?}", err);
}

#[test]
fn test_missing_export_is_rejected() {
    let wasm = wat::parse_str(
        r#"
        (module
          (memory (export "memory") 1)
          (func (export "get_version") (result i32) (i32.const 1)))
        "#,
    )
    .unwrap();
    let err = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &wasm)
        .err()
        .unwrap();
    match err {
        SandboxError::ModuleLoad(msg) => assert!(msg.contains("allocate"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unsupported_abi_version_is_rejected() {
    let wasm = module(2, BUMP_ALLOCATE, GOOD_ANALYZE, "");
    let err = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &wasm)
        .err()
        .unwrap();
    match err {
        SandboxError::ModuleLoad(msg) => assert!(msg.contains("version 2"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_zero_allocation_falls_back_to_heuristic() {
    let wasm = module(1, "(i32.const 0)", GOOD_ANALYZE, "");
    let executor = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &wasm).unwrap();

    let err = executor.execute(&request(b"content"), Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, SandboxError::AllocationFailure(_)), "{:?}", err);

    let fallback = FallbackExecutor::new(executor);
    let result = fallback.execute(&request(b"content"), Duration::from_secs(1)).unwrap();
    assert!(result.degraded);
    assert_eq!(result.source, Tier1Source::Heuristic);
    assert!(result.findings.iter().any(|f| f.starts_with("Module failure")));
}

#[test]
fn test_out_of_range_score_is_a_decode_error() {
    let analyze = r#"
        (f32.store (i32.const 64) (f32.const 1.5))
        (f32.store (i32.const 68) (f32.const 0.1))
        (i32.store (i32.const 72) (i32.const 0))
        (i64.store (i32.const 76) (i64.const 0))
        (i32.store (i32.const 84) (i32.const 0))
        (i32.const 64)
    "#;
    let wasm = module(1, BUMP_ALLOCATE, analyze, "");
    let executor = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &wasm).unwrap();
    let err = executor.execute(&request(b"x"), Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, SandboxError::ResultDecode(_)), "{:?}", err);
}

#[test]
fn test_record_running_past_memory_end_is_rejected() {
    // 24 bytes fit before the end of the single page, the reserved word does not
    let analyze = r#"
        (f32.store (i32.const 65512) (f32.const 0.5))
        (f32.store (i32.const 65516) (f32.const 0.5))
        (i32.store (i32.const 65520) (i32.const 0))
        (i64.store (i32.const 65524) (i64.const 0))
        (i32.store (i32.const 65532) (i32.const 0))
        (i32.const 65512)
    "#;
    let wasm = module(1, BUMP_ALLOCATE, analyze, "");
    let executor = WasmTier1Executor::from_bytes(runtime(16 * ONE_MIB, DEFAULT_FUEL), &wasm).unwrap();

    match executor.execute(&request(b"x"), Duration::from_secs(1)).unwrap_err() {
        SandboxError::ResultDecode(msg) => assert!(msg.contains("exceeds memory size"), "{}", msg),
        other => panic!("expected decode error, got {:?}", other),
    }
}

#[test]
fn test_module_error_code_makes_result_unusable() {
    let analyze = r#"
        (f32.store (i32.const 64) (f32.const 0.5))
        (f32.store (i32.const 68) (f32.const 0.5))
        (i32.store (i32.const 72) (i32.const 0))
        (i64.store (i32.const 76) (i64.const 0))
        (i32.store (i32.const 84) (i32.const 7))
        (i32.const 64)
    "#;
    let wasm = module(1, BUMP_ALLOCATE, analyze, "");
    let executor = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &wasm).unwrap();
    let err = executor.execute(&request(b"x"), Duration::from_secs(1)).unwrap_err();
    match err {
        SandboxError::ResultDecode(msg) => assert!(msg.contains("error code 7"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_trapping_deallocate_does_not_lose_result() {
    let wasm = module(1, BUMP_ALLOCATE, GOOD_ANALYZE, "(unreachable)");
    let executor = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &wasm).unwrap();
    let result = executor.execute(&request(b"x"), Duration::from_secs(1)).unwrap();
    assert_eq!(result.pattern_score, 0.9);
}

#[test]
fn test_host_imports_are_available() {
    let wasm = wat::parse_str(format!(
        r#"
        (module
          (import "env" "log" (func $log (param i32 i32 i32)))
          (import "env" "current_time_ms" (func $now (result i64)))
          (memory (export "memory") 1)
          (data (i32.const 16) "scanning")
          (global $next (mut i32) (i32.const 1024))
          (func (export "get_version") (result i32) (i32.const 1))
          (func (export "allocate") (param $size i32) (result i32) {BUMP_ALLOCATE})
          (func (export "deallocate") (param i32 i32))
          (func (export "analyze_file") (param $ptr i32) (param $len i32) (result i32)
            (call $log (i32.const 2) (i32.const 16) (i32.const 8))
            ;; out-of-bounds log requests are ignored, not trapped
            (call $log (i32.const 2) (i32.const 65530) (i32.const 100))
            (drop (call $now))
            {GOOD_ANALYZE})
        )
        "#
    ))
    .unwrap();
    let executor = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &wasm).unwrap();
    let result = executor.execute(&request(b"x"), Duration::from_secs(1)).unwrap();
    assert_eq!(result.detected_pattern_count, 2);
}

#[test]
fn test_oversized_input_is_an_allocation_failure() {
    // 4 MiB of content cannot be written into a 1-page memory
    let executor = WasmTier1Executor::from_bytes(runtime(ONE_MIB, DEFAULT_FUEL), &good_module()).unwrap();
    let content = vec![0u8; 4 * ONE_MIB as usize];
    let err = executor.execute(&request(&content), Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, SandboxError::AllocationFailure(_)), "{:?}", err);
}
