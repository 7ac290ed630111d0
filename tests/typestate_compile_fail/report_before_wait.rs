/// This test should FAIL to compile
/// Taking the report of a run that is still executing

use sentinel_sandbox::core::supervisor::{SandboxRun, Tier2Sandbox};
use sentinel_sandbox::core::types::AnalysisRequest;
use sentinel_sandbox::SandboxConfig;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let config = Arc::new(SandboxConfig::default());
    let sandbox = Tier2Sandbox::probe(&config).into_option().expect("tier2");
    let request = AnalysisRequest::new(b"#!/bin/sh\n", "x.sh", Duration::from_secs(1), config);

    let running = SandboxRun::new(&sandbox, &request)
        .prepare()
        .expect("prepare")
        .launch(Duration::from_secs(1))
        .expect("launch");

    // This should fail: Running has no into_report method
    let _ = running.into_report();
}
