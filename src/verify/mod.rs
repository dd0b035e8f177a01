//! Verification stage: confirm the remediation actually healed the device.

pub mod condition;
pub mod criteria;
pub mod verifier;

use std::time::Duration;

use serde_json::json;
use tracing::info;

pub use self::verifier::{StabilityReport, VerificationReport, Verifier};

use crate::incident::timeline::{Agent, DiagnosticLogEntry, EventAction, EventRecord, LogType};
use crate::incident::{Incident, Stage, VerificationCheckResult};
use crate::tools::Toolset;

#[derive(Debug, Clone)]
pub struct VerificationUpdate {
    pub checks: Vec<VerificationCheckResult>,
    pub passed: bool,
    pub elapsed: Duration,
    pub events: Vec<EventRecord>,
    pub logs: Vec<DiagnosticLogEntry>,
}

pub async fn run(incident: &Incident, tools: &Toolset, settle: Duration) -> VerificationUpdate {
    let report = Verifier::new(tools, settle)
        .verify(&incident.device, incident.fault_type)
        .await;
    info!(
        incident = %incident.id,
        passed = report.passed,
        checks_passed = report.checks_passed,
        checks_total = report.checks.len(),
        "verification finished"
    );

    let action = if report.passed {
        EventAction::VerificationPassed
    } else {
        EventAction::VerificationFailed
    };
    let verification_time = report.elapsed.as_secs_f64();
    let timings = incident.timings;
    let event = EventRecord::new(Stage::Verification, Agent::VerificationAgent, action)
        .with_details(json!({
            "checks_total": report.checks.len(),
            "checks_passed": report.checks_passed,
            "critical_passed": report.critical_passed,
            "verification_time": verification_time,
            "total_incident_time": timings.ttd_seconds + timings.ttr_seconds + verification_time,
        }));

    let log = DiagnosticLogEntry::new(
        Stage::Verification,
        Agent::VerificationAgent,
        LogType::NetworkData,
        "Verification checks",
        json!(report.checks),
    );

    VerificationUpdate {
        checks: report.checks,
        passed: report.passed,
        elapsed: report.elapsed,
        events: vec![event],
        logs: vec![log],
    }
}

/// Re-verify a healed device across `window` and score how often it held.
///
/// Annotation only: the event and log are appended to the timeline, the
/// incident outcome is left alone.
pub async fn observe(
    incident: &Incident,
    tools: &Toolset,
    window: Duration,
    interval: Duration,
) -> (StabilityReport, EventRecord, DiagnosticLogEntry) {
    let report = Verifier::new(tools, Duration::ZERO)
        .observe_stability(&incident.device, incident.fault_type, window, interval)
        .await;

    let event = EventRecord::new(
        Stage::Verification,
        Agent::VerificationAgent,
        EventAction::StabilityObserved,
    )
    .with_details(json!({
        "stability_score": report.stability_score,
        "checks_passed": report.checks_passed,
        "checks_total": report.checks_total,
        "stable": report.stable,
    }));
    let log = DiagnosticLogEntry::new(
        Stage::Verification,
        Agent::VerificationAgent,
        LogType::Decision,
        "Stability observation",
        json!(report),
    );
    (report, event, log)
}
