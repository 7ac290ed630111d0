/// Compile-fail tests for type-state ordering
///
/// Each case drives a chain out of order; every one must be rejected by the
/// compiler, so the orderings cannot be violated at runtime.

#[test]
fn typestate_compile_fail_tests() {
    let t = trybuild::TestCases::new();

    // Child setup steps cannot be skipped
    t.compile_fail("tests/typestate_compile_fail/skip_lifecycle_binding.rs");
    t.compile_fail("tests/typestate_compile_fail/filter_before_privs_locked.rs");
    t.compile_fail("tests/typestate_compile_fail/finish_before_filter.rs");

    // Tier2 run states cannot be driven out of order
    t.compile_fail("tests/typestate_compile_fail/wait_before_launch.rs");
    t.compile_fail("tests/typestate_compile_fail/report_before_wait.rs");

    // A consumed state cannot be reused
    t.compile_fail("tests/typestate_compile_fail/reuse_consumed_state.rs");
    t.compile_fail("tests/typestate_compile_fail/reuse_consumed_run.rs");
}
