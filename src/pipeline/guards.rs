//! Guard conditions between pipeline stages.
//!
//! Pure functions of the values they inspect, so every branch of the state
//! machine can be exercised without collaborators.

use crate::incident::{FaultType, RiskLevel};

pub const MIN_DETECTION_CONFIDENCE: f64 = 0.3;
pub const MIN_RCA_CONFIDENCE: f64 = 0.4;
/// Confidence a high-risk plan needs before it may run unattended.
pub const HIGH_RISK_RCA_CONFIDENCE: f64 = 0.8;
/// Verification failures tolerated before the incident is given up on.
pub const MAX_VERIFICATION_RETRIES: usize = 2;

/// Detection -> RCA.
pub fn after_detection(confidence: f64, fault: FaultType) -> bool {
    confidence >= MIN_DETECTION_CONFIDENCE && fault.is_known()
}

/// RCA -> Remediation.
pub fn after_rca(confidence: f64, risk: RiskLevel) -> bool {
    confidence >= MIN_RCA_CONFIDENCE
        && !(risk == RiskLevel::High && confidence < HIGH_RISK_RCA_CONFIDENCE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationDecision {
    Resolve,
    Retry,
    Exhaust,
}

/// Verification -> Resolved | RCA | FailedExhausted.
///
/// `prior_failures` excludes the failure recorded by the attempt being
/// judged.
pub fn after_verification(passed: bool, prior_failures: usize) -> VerificationDecision {
    if passed {
        VerificationDecision::Resolve
    } else if prior_failures < MAX_VERIFICATION_RETRIES {
        VerificationDecision::Retry
    } else {
        VerificationDecision::Exhaust
    }
}
