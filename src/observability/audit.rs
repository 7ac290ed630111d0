/// Structured audit events
/// Security-relevant lifecycle events serialized as JSON and emitted through
/// `log` under the `sentinel::audit` target. Persisting them is left to
/// whatever logger the host installs.
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const AUDIT_TARGET: &str = "sentinel::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    AnalysisStarted {
        analysis_id: String,
        filename: String,
        size: usize,
        fingerprint: String,
    },
    AnalysisFinished {
        analysis_id: String,
        classification: String,
        confidence: f32,
        decision_path: String,
        latency_ms: u64,
    },
    AnalysisFailed {
        analysis_id: String,
        error: String,
    },
    /// A tier ran in a weaker mode or gave no signal
    TierDegraded {
        analysis_id: String,
        tier: u8,
        reason: String,
    },
    /// The candidate was killed for a kill-tier syscall
    PolicyKill {
        analysis_id: String,
        root_pid: i32,
        detail: String,
    },
    WatchdogKill {
        analysis_id: String,
        root_pid: i32,
        budget_ms: u64,
    },
    CleanupFailed {
        path: String,
        error: String,
    },
}

impl AuditEvent {
    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditEvent::AnalysisStarted { .. } | AuditEvent::AnalysisFinished { .. } => AuditSeverity::Low,
            AuditEvent::TierDegraded { .. } => AuditSeverity::Medium,
            AuditEvent::AnalysisFailed { .. } | AuditEvent::WatchdogKill { .. } => AuditSeverity::High,
            AuditEvent::PolicyKill { .. } | AuditEvent::CleanupFailed { .. } => AuditSeverity::Critical,
        }
    }
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: DateTime<Utc>,
    severity: AuditSeverity,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// JSON line for one event
pub fn render(event: &AuditEvent) -> String {
    let record = AuditRecord {
        timestamp: Utc::now(),
        severity: event.severity(),
        event,
    };
    serde_json::to_string(&record).unwrap_or_else(|e| format!("{{\"event\":\"unserializable\",\"error\":\"{}\"}}", e))
}

/// Emit at `info` for routine events, `warn` for the rest
pub fn emit(event: &AuditEvent) {
    let level = if event.severity() <= AuditSeverity::Medium {
        log::Level::Info
    } else {
        log::Level::Warn
    };
    if log::log_enabled!(target: AUDIT_TARGET, level) {
        log::log!(target: AUDIT_TARGET, level, "{}", render(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_tagged_json() {
        let line = render(&AuditEvent::WatchdogKill {
            analysis_id: "a1".to_string(),
            root_pid: 42,
            budget_ms: 5000,
        });
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "watchdog_kill");
        assert_eq!(value["root_pid"], 42);
        assert_eq!(value["severity"], "High");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_severity_ordering() {
        let cleanup = AuditEvent::CleanupFailed {
            path: "/tmp/x".to_string(),
            error: "busy".to_string(),
        };
        assert_eq!(cleanup.severity(), AuditSeverity::Critical);
        assert!(AuditSeverity::Low < AuditSeverity::Critical);
    }
}
