/// This test should FAIL to compile
/// Waiting on a run whose candidate was never launched

use sentinel_sandbox::core::supervisor::{SandboxRun, Tier2Sandbox};
use sentinel_sandbox::core::types::AnalysisRequest;
use sentinel_sandbox::SandboxConfig;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let config = Arc::new(SandboxConfig::default());
    let sandbox = Tier2Sandbox::probe(&config).into_option().expect("tier2");
    let request = AnalysisRequest::new(b"#!/bin/sh\n", "x.sh", Duration::from_secs(1), config);

    let run = SandboxRun::new(&sandbox, &request).prepare().expect("prepare");

    // This should fail: Prepared has no wait method
    let _ = run.wait();
}
