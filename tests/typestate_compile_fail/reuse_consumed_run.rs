/// This test should FAIL to compile
/// Launching the same prepared run twice

use sentinel_sandbox::core::supervisor::{SandboxRun, Tier2Sandbox};
use sentinel_sandbox::core::types::AnalysisRequest;
use sentinel_sandbox::SandboxConfig;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let config = Arc::new(SandboxConfig::default());
    let sandbox = Tier2Sandbox::probe(&config).into_option().expect("tier2");
    let request = AnalysisRequest::new(b"#!/bin/sh\n", "x.sh", Duration::from_secs(1), config);

    let prepared = SandboxRun::new(&sandbox, &request).prepare().expect("prepare");
    let _first = prepared.launch(Duration::from_secs(1));

    // This should fail: prepared was moved by the first launch
    let _second = prepared.launch(Duration::from_secs(1));
}
