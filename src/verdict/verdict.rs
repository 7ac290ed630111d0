/// Verdict derivation
/// Deterministic fusion of Tier1 and Tier2 signals into one terminal
/// classification with a confidence value. Also owns the escalation rule
/// deciding whether Tier2 is worth running.
use crate::config::types::VerdictPolicy;
use crate::tier1::Tier1Result;
use crate::verdict::behavior::BehavioralMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Extra confidence when both tiers land in the same class
const AGREEMENT_BONUS: f32 = 0.05;
/// Composite reported when no tier produced a signal
const NO_SIGNAL_SCORE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Classification {
    Clean,
    Suspicious,
    Malicious,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Clean => write!(f, "Clean"),
            Classification::Suspicious => write!(f, "Suspicious"),
            Classification::Malicious => write!(f, "Malicious"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Tier1,
    Tier2,
}

/// One tier's contribution to a verdict
#[derive(Debug, Clone, Serialize)]
pub struct ContributingSignal {
    pub tier: Tier,
    pub source: String,
    pub score: f32,
    pub classification: Classification,
    pub degraded: bool,
    pub reasons: Vec<String>,
}

/// How the verdict was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    /// Tier1 was confident; Tier2 skipped
    Tier1Confident,
    /// Escalation wanted but Tier2 gave no signal
    Tier1Only,
    /// Tier1 gave no signal, Tier2 did
    Tier2Only,
    /// Both tiers ran and did not contradict each other
    Fused,
    /// One tier said clean, the other malicious
    Disagreement,
    /// Neither tier produced a usable signal
    NoSignal,
}

/// Tier2 as seen by the verdict engine
#[derive(Debug, Clone, Copy)]
pub enum Tier2Status<'a> {
    Ran(&'a BehavioralMetrics),
    /// Escalation rule decided against it
    Skipped,
    /// Host lacks the sandbox or it is disabled
    Unavailable(&'a str),
    /// Content is not something the sandbox can execute
    NotApplicable,
    /// Budget exhausted before Tier2 could start
    OutOfTime,
    Failed(&'a str),
}

impl Tier2Status<'_> {
    fn describe(&self) -> String {
        match self {
            Tier2Status::Ran(_) => "ran".to_string(),
            Tier2Status::Skipped => "skipped: Tier1 confident".to_string(),
            Tier2Status::Unavailable(reason) => format!("unavailable: {}", reason),
            Tier2Status::NotApplicable => "not applicable to this content".to_string(),
            Tier2Status::OutOfTime => "skipped: no time left in budget".to_string(),
            Tier2Status::Failed(reason) => format!("failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    Skip,
    Escalate(&'static str),
}

impl Escalation {
    pub fn is_escalate(&self) -> bool {
        matches!(self, Escalation::Escalate(_))
    }
}

/// Final artifact returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub classification: Classification,
    pub confidence: f32,
    pub composite_score: f32,
    pub tier1_score: Option<f32>,
    pub tier2_score: Option<f32>,
    pub signals: Vec<ContributingSignal>,
    pub decision_path: DecisionPath,
    /// SHA-256 of the analyzed bytes
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
    pub explanation: String,
}

pub struct VerdictEngine {
    policy: VerdictPolicy,
}

impl VerdictEngine {
    pub fn new(policy: VerdictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VerdictPolicy {
        &self.policy
    }

    pub fn classify(&self, score: f32) -> Classification {
        if score < self.policy.clean_below {
            Classification::Clean
        } else if score >= self.policy.malicious_at {
            Classification::Malicious
        } else {
            Classification::Suspicious
        }
    }

    pub fn tier1_score(&self, result: &Tier1Result) -> f32 {
        result.combined_score(self.policy.tier1_pattern_weight)
    }

    /// Decide whether Tier1 alone is conclusive
    pub fn escalation(&self, tier1: Option<&Tier1Result>) -> Escalation {
        let Some(result) = tier1 else {
            return Escalation::Escalate("Tier1 produced no signal");
        };
        if result.degraded {
            return Escalation::Escalate("Tier1 signal is degraded");
        }
        if result.timed_out {
            return Escalation::Escalate("Tier1 timed out");
        }
        let score = self.tier1_score(result);
        if score <= self.policy.confident_clean_max || score >= self.policy.confident_malicious_min {
            Escalation::Skip
        } else {
            Escalation::Escalate("Tier1 score is inconclusive")
        }
    }

    /// Confidence from distance to the midpoint, 0.5 at the midpoint
    fn single_tier_confidence(&self, score: f32, degraded: bool) -> f32 {
        let separation = ((score - 0.5).abs() * 2.0).clamp(0.0, 1.0);
        let cap = if degraded {
            self.policy.degraded_confidence_cap.min(self.policy.tier1_only_confidence_cap)
        } else {
            self.policy.tier1_only_confidence_cap
        };
        (0.5 + 0.5 * separation).min(cap).max(self.policy.min_confidence)
    }

    fn tier1_signal(&self, result: &Tier1Result) -> ContributingSignal {
        let score = self.tier1_score(result);
        let mut reasons = vec![format!(
            "pattern {:.2}, ml {:.2}, {} patterns",
            result.pattern_score, result.ml_score, result.detected_pattern_count
        )];
        reasons.extend(result.findings.iter().cloned());
        ContributingSignal {
            tier: Tier::Tier1,
            source: result.source.to_string(),
            score,
            classification: self.classify(score),
            degraded: result.degraded || result.timed_out,
            reasons,
        }
    }

    fn tier2_signal(&self, metrics: &BehavioralMetrics) -> ContributingSignal {
        let score = metrics.threat_score.clamp(0.0, 1.0);
        let mut reasons = vec![format!(
            "{} syscalls, {} file ops{}",
            metrics.syscalls_observed,
            metrics.file_operations(),
            if metrics.timed_out { ", timed out" } else { "" }
        )];
        reasons.extend(metrics.suspicious_behaviors.iter().cloned());
        ContributingSignal {
            tier: Tier::Tier2,
            source: "behavioral".to_string(),
            score,
            classification: self.classify(score),
            degraded: false,
            reasons,
        }
    }

    /// Fuse whatever signals exist into a verdict
    pub fn decide(&self, fingerprint: &str, tier1: Option<&Tier1Result>, tier2: Tier2Status<'_>) -> Verdict {
        let t1 = tier1.map(|r| self.tier1_signal(r));
        let t2 = match tier2 {
            Tier2Status::Ran(metrics) => Some(self.tier2_signal(metrics)),
            _ => None,
        };

        let (classification, confidence, composite, path) = match (&t1, &t2) {
            (Some(a), Some(b)) => self.fuse(a, b),
            (Some(a), None) => {
                let path = if matches!(tier2, Tier2Status::Skipped) {
                    DecisionPath::Tier1Confident
                } else {
                    DecisionPath::Tier1Only
                };
                (
                    a.classification,
                    self.single_tier_confidence(a.score, a.degraded),
                    a.score,
                    path,
                )
            }
            (None, Some(b)) => (
                b.classification,
                self.single_tier_confidence(b.score, false),
                b.score,
                DecisionPath::Tier2Only,
            ),
            (None, None) => (
                Classification::Suspicious,
                self.policy.min_confidence,
                NO_SIGNAL_SCORE,
                DecisionPath::NoSignal,
            ),
        };

        let explanation = explain(classification, path, &t1, &t2, &tier2);
        let tier1_score = t1.as_ref().map(|s| s.score);
        let tier2_score = t2.as_ref().map(|s| s.score);

        Verdict {
            classification,
            confidence: confidence.clamp(0.0, 1.0),
            composite_score: composite.clamp(0.0, 1.0),
            tier1_score,
            tier2_score,
            signals: t1.into_iter().chain(t2).collect(),
            decision_path: path,
            fingerprint: fingerprint.to_string(),
            timestamp: Utc::now(),
            explanation,
        }
    }

    fn fuse(&self, t1: &ContributingSignal, t2: &ContributingSignal) -> (Classification, f32, f32, DecisionPath) {
        let gap = (t1.score - t2.score).abs();
        let w = self.policy.tier1_fusion_weight;
        let composite = w * t1.score + (1.0 - w) * t2.score;

        let contradictory = matches!(
            (t1.classification, t2.classification),
            (Classification::Clean, Classification::Malicious) | (Classification::Malicious, Classification::Clean)
        );
        if contradictory {
            let confidence = ((1.0 - gap) * 0.5).max(self.policy.min_confidence);
            return (Classification::Suspicious, confidence, composite, DecisionPath::Disagreement);
        }

        let mut confidence = 1.0 - gap;
        if t1.classification == t2.classification {
            confidence += AGREEMENT_BONUS;
        }
        let confidence = confidence.clamp(self.policy.min_confidence, 1.0);
        (self.classify(composite), confidence, composite, DecisionPath::Fused)
    }
}

fn explain(
    classification: Classification,
    path: DecisionPath,
    t1: &Option<ContributingSignal>,
    t2: &Option<ContributingSignal>,
    tier2: &Tier2Status<'_>,
) -> String {
    let t1_part = match t1 {
        Some(s) => format!("Tier1 {} ({:.2}{})", s.classification, s.score, if s.degraded { ", degraded" } else { "" }),
        None => "Tier1 produced no signal".to_string(),
    };
    let t2_part = match t2 {
        Some(s) => format!("Tier2 {} ({:.2})", s.classification, s.score),
        None => format!("Tier2 {}", tier2.describe()),
    };
    let lead = match path {
        DecisionPath::Disagreement => "Tiers disagree",
        DecisionPath::NoSignal => "No tier produced a usable signal",
        DecisionPath::Fused => "Fused both tiers",
        DecisionPath::Tier1Confident => "Tier1 conclusive",
        DecisionPath::Tier1Only => "Tier1 only",
        DecisionPath::Tier2Only => "Tier2 only",
    };
    format!("{}: {}; {}; {}", classification, lead, t1_part, t2_part)
}
