// Tier2 on hosts without the ptrace monitor
//
// Same surface as the Linux x86_64 supervisor; the probe always reports the
// capability as unavailable, so no value of this type is ever built.

use crate::config::types::{Result, SandboxConfig};
use crate::core::types::{AnalysisRequest, Capability, Tier2Report};
use crate::monitor::MonitorMechanism;
use std::convert::Infallible;
use std::time::Duration;

#[derive(Debug)]
pub struct Tier2Sandbox {
    never: Infallible,
}

impl Tier2Sandbox {
    pub fn probe(_config: &SandboxConfig) -> Capability<Self> {
        Capability::unavailable("Tier2 requires Linux on x86_64")
    }

    pub fn is_applicable(content: &[u8]) -> bool {
        content.starts_with(b"\x7fELF") || content.starts_with(b"#!")
    }

    pub fn mechanism(&self) -> MonitorMechanism {
        match self.never {}
    }

    pub fn namespaces(&self) -> Vec<&'static str> {
        match self.never {}
    }

    pub fn run(&self, _request: &AnalysisRequest, _budget: Duration) -> Result<Tier2Report> {
        match self.never {}
    }
}
