//! Terminal incident summary returned by trigger and status queries.

use serde::{Deserialize, Serialize};

use super::timeline::{DiagnosticLogEntry, EventRecord};
use super::{
    FaultType, Incident, Outcome, RemediationActionResult, RiskLevel, Stage,
    VerificationCheckResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSummary {
    pub detection: f64,
    pub rca: f64,
    pub remediation: f64,
    pub verification: f64,
    pub total: f64,
}

/// Read-only snapshot of an incident, shaped for API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub incident_id: String,
    pub device_id: String,
    pub device_name: String,
    pub stage: Stage,
    pub outcome: Option<Outcome>,
    pub fault_type: FaultType,
    pub claimed_fault: FaultType,
    pub root_cause: String,
    pub verification_passed: bool,
    pub timing: TimingSummary,
    pub events: Vec<EventRecord>,
    pub actions: Vec<RemediationActionResult>,
    pub internal_logs: Vec<DiagnosticLogEntry>,
    pub verification_checks: Vec<VerificationCheckResult>,
    pub rca_hypothesis: String,
    pub rca_evidence: Vec<String>,
    pub remediation_plan: Vec<String>,
    pub remediation_risk: RiskLevel,
    pub detection_confidence: f64,
    pub detection_method: String,
    pub rca_confidence: f64,
    pub retry_count: u32,
    pub error: Option<String>,
}

impl From<&Incident> for IncidentReport {
    fn from(incident: &Incident) -> Self {
        let timings = incident.timings;
        Self {
            incident_id: incident.id.clone(),
            device_id: incident.device.id.clone(),
            device_name: incident.device.name.clone(),
            stage: incident.stage(),
            outcome: incident.outcome,
            fault_type: incident.fault_type,
            claimed_fault: incident.claimed_fault,
            root_cause: incident.root_cause.clone(),
            verification_passed: incident.verification_passed,
            timing: TimingSummary {
                detection: timings.ttd_seconds,
                rca: timings.rca_seconds,
                remediation: timings.ttr_seconds,
                verification: timings.tttr_seconds,
                total: timings.total(),
            },
            events: incident.events().to_vec(),
            actions: incident.remediation_actions().to_vec(),
            internal_logs: incident.timeline().internal_logs().to_vec(),
            verification_checks: incident.verification_checks.clone(),
            rca_hypothesis: incident.rca_hypothesis.clone(),
            rca_evidence: incident.rca_evidence.clone(),
            remediation_plan: incident.remediation_plan.clone(),
            remediation_risk: incident.remediation_risk,
            detection_confidence: incident.detection_confidence,
            detection_method: incident.detection_method.clone(),
            rca_confidence: incident.rca_confidence,
            retry_count: incident.retry_count,
            error: incident.error.clone(),
        }
    }
}

impl From<Incident> for IncidentReport {
    fn from(incident: Incident) -> Self {
        IncidentReport::from(&incident)
    }
}
