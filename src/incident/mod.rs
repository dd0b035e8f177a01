//! Incident aggregate and the value objects stages attach to it.

pub mod report;
pub mod timeline;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::timeline::{DiagnosticLogEntry, EventAction, EventRecord, Timeline};

pub use self::report::IncidentReport;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Known fault classes, in scoring order. `Unknown` always sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    BgpLinkFlap,
    BgpSessionInstability,
    TrafficDrop,
    CpuSpike,
    MemoryExhaustion,
    #[serde(other)]
    Unknown,
}

impl FaultType {
    /// Every variant in enumeration order. Ties in evidence scoring are
    /// broken by position in this array.
    pub const ALL: [FaultType; 6] = [
        FaultType::BgpLinkFlap,
        FaultType::BgpSessionInstability,
        FaultType::TrafficDrop,
        FaultType::CpuSpike,
        FaultType::MemoryExhaustion,
        FaultType::Unknown,
    ];

    pub const KNOWN: [FaultType; 5] = [
        FaultType::BgpLinkFlap,
        FaultType::BgpSessionInstability,
        FaultType::TrafficDrop,
        FaultType::CpuSpike,
        FaultType::MemoryExhaustion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultType::BgpLinkFlap => "bgp_link_flap",
            FaultType::BgpSessionInstability => "bgp_session_instability",
            FaultType::TrafficDrop => "traffic_drop",
            FaultType::CpuSpike => "cpu_spike",
            FaultType::MemoryExhaustion => "memory_exhaustion",
            FaultType::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != FaultType::Unknown
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultType {
    type Err = std::convert::Infallible;

    /// Unrecognised names classify as `Unknown` rather than failing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Ok(FaultType::KNOWN
            .into_iter()
            .find(|ft| ft.as_str() == lowered)
            .unwrap_or(FaultType::Unknown))
    }
}

/// Operator-declared incident severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("invalid severity '{0}' (expected critical, high, medium or low)")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(ParseSeverityError(other.to_string())),
        }
    }
}

/// Severity attached to a metric anomaly by the metrics collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Critical,
    Warning,
    Info,
}

/// Risk classification for a whole plan or a single playbook action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Pipeline position of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detection,
    Rca,
    Remediation,
    Verification,
    Resolved,
    FailedUnconfirmed,
    FailedNoAction,
    FailedExhausted,
    /// An unexpected error escaped a stage and was converted to data.
    FailedError,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Stage::Resolved
                | Stage::FailedUnconfirmed
                | Stage::FailedNoAction
                | Stage::FailedExhausted
                | Stage::FailedError
        )
    }

    /// Forward moves through the four working stages, the single
    /// Verification -> RCA loop, and any working stage into a terminal
    /// failure reachable from it.
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (*self, next),
            (Detection, Rca)
                | (Detection, FailedUnconfirmed)
                | (Rca, Remediation)
                | (Rca, FailedNoAction)
                | (Remediation, Verification)
                | (Verification, Resolved)
                | (Verification, Rca)
                | (Verification, FailedExhausted)
                | (Detection | Rca | Remediation | Verification, FailedError)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Detection => "detection",
            Stage::Rca => "rca",
            Stage::Remediation => "remediation",
            Stage::Verification => "verification",
            Stage::Resolved => "resolved",
            Stage::FailedUnconfirmed => "failed_unconfirmed",
            Stage::FailedNoAction => "failed_no_action",
            Stage::FailedExhausted => "failed_exhausted",
            Stage::FailedError => "failed_error",
        };
        f.write_str(s)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Resolved,
    UnconfirmedDetection,
    SkippedRemediation,
    VerificationExhausted,
    UnhandledPipelineError,
}

impl Outcome {
    pub fn terminal_stage(&self) -> Stage {
        match self {
            Outcome::Resolved => Stage::Resolved,
            Outcome::UnconfirmedDetection => Stage::FailedUnconfirmed,
            Outcome::SkippedRemediation => Stage::FailedNoAction,
            Outcome::VerificationExhausted => Stage::FailedExhausted,
            Outcome::UnhandledPipelineError => Stage::FailedError,
        }
    }
}

/// How a failed remediation action affected the rest of the playbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFailure {
    /// The playbook continued past this action.
    Partial,
    /// A high-risk action failed; remaining actions were aborted.
    Critical,
}

// ---------------------------------------------------------------------------
// Value objects
// ---------------------------------------------------------------------------

/// Identity of the device an incident was raised against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: String,
    pub name: String,
    pub device_type: String,
}

/// Normalised record of one observed anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDeviation {
    pub metric_name: String,
    pub baseline: f64,
    pub current: f64,
    pub threshold: f64,
    pub deviation_sigma: f64,
    pub severity: AnomalySeverity,
}

/// Outcome of one executed (or rolled back) remediation action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationActionResult {
    pub action_type: String,
    pub command: String,
    pub target_device: String,
    pub description: String,
    pub risk: RiskLevel,
    pub executed: bool,
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ActionFailure>,
    /// Set on rollback records: the action type this record reverts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of one verification criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheckResult {
    pub check_name: String,
    pub description: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    pub critical: bool,
    pub timestamp: DateTime<Utc>,
}

/// Elapsed seconds per stage. Retried stages keep the latest attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub ttd_seconds: f64,
    pub rca_seconds: f64,
    pub ttr_seconds: f64,
    pub tttr_seconds: f64,
}

impl StageTimings {
    /// Detection + remediation + verification time.
    pub fn total(&self) -> f64 {
        self.ttd_seconds + self.ttr_seconds + self.tttr_seconds
    }
}

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal stage transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: Stage,
    pub to: Stage,
}

/// Root aggregate for a single pipeline run.
///
/// Owned by exactly one orchestrator run. `stage` and the timeline are only
/// reachable through [`Incident::advance`] and the append methods so that
/// transitions stay legal and records stay immutable.
#[derive(Debug, Clone)]
pub struct Incident {
    pub id: String,
    pub device: DeviceRef,
    /// Fault type declared by the trigger.
    pub claimed_fault: FaultType,
    /// Current classification; starts as the claim, replaced by detection.
    pub fault_type: FaultType,
    pub severity: Severity,
    stage: Stage,

    pub detection_confidence: f64,
    pub detection_method: String,
    pub metric_deviations: Vec<MetricDeviation>,

    pub root_cause: String,
    pub rca_confidence: f64,
    pub rca_hypothesis: String,
    pub rca_evidence: Vec<String>,
    pub affected_devices: Vec<String>,

    pub remediation_plan: Vec<String>,
    pub remediation_risk: RiskLevel,
    remediation_actions: Vec<RemediationActionResult>,

    pub verification_checks: Vec<VerificationCheckResult>,
    pub verification_passed: bool,

    pub timings: StageTimings,
    /// Number of Verification -> RCA loops taken.
    pub retry_count: u32,
    pub outcome: Option<Outcome>,
    pub error: Option<String>,
    timeline: Timeline,
}

impl Incident {
    pub fn new(
        id: impl Into<String>,
        device: DeviceRef,
        fault_type: FaultType,
        severity: Severity,
    ) -> Self {
        let affected = vec![device.id.clone()];
        Self {
            id: id.into(),
            device,
            claimed_fault: fault_type,
            fault_type,
            severity,
            stage: Stage::Detection,
            detection_confidence: 0.0,
            detection_method: String::new(),
            metric_deviations: Vec::new(),
            root_cause: String::new(),
            rca_confidence: 0.0,
            rca_hypothesis: String::new(),
            rca_evidence: Vec::new(),
            affected_devices: affected,
            remediation_plan: Vec::new(),
            remediation_risk: RiskLevel::Low,
            remediation_actions: Vec::new(),
            verification_checks: Vec::new(),
            verification_passed: false,
            timings: StageTimings::default(),
            retry_count: 0,
            outcome: None,
            error: None,
            timeline: Timeline::new(),
        }
    }

    /// Generate an operator-friendly id such as `INC-3F9A0C1B`.
    pub fn generate_id() -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("INC-{}", hex[..8].to_ascii_uppercase())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Move to `next`, refusing any transition the state machine forbids.
    pub fn advance(&mut self, next: Stage) -> Result<(), IllegalTransition> {
        if !self.stage.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Force the terminal error stage. Used only at the orchestrator
    /// boundary when an unexpected failure has to be converted to data.
    pub(crate) fn fail_with_error(&mut self, message: impl Into<String>) {
        if !self.stage.is_terminal() {
            self.stage = Stage::FailedError;
        }
        self.outcome = Some(Outcome::UnhandledPipelineError);
        self.error = Some(message.into());
    }

    pub fn remediation_actions(&self) -> &[RemediationActionResult] {
        &self.remediation_actions
    }

    pub fn push_actions(&mut self, actions: impl IntoIterator<Item = RemediationActionResult>) {
        self.remediation_actions.extend(actions);
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn events(&self) -> &[EventRecord] {
        self.timeline.events()
    }

    pub fn record(&mut self, event: EventRecord) {
        self.timeline.push_event(event);
    }

    pub fn record_all(&mut self, events: impl IntoIterator<Item = EventRecord>) {
        self.timeline.extend_events(events);
    }

    pub fn log(&mut self, entry: DiagnosticLogEntry) {
        self.timeline.push_log(entry);
    }

    pub fn log_all(&mut self, entries: impl IntoIterator<Item = DiagnosticLogEntry>) {
        self.timeline.extend_logs(entries);
    }

    /// Verification failures recorded so far, derived from the timeline.
    pub fn verification_failures(&self) -> usize {
        self.timeline.count(EventAction::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceRef {
        DeviceRef {
            id: "device-1".into(),
            name: "core-1".into(),
            device_type: "core".into(),
        }
    }

    #[test]
    fn test_new_incident_defaults() {
        let incident = Incident::new("INC-1", device(), FaultType::CpuSpike, Severity::High);
        assert_eq!(incident.stage(), Stage::Detection);
        assert_eq!(incident.detection_confidence, 0.0);
        assert_eq!(incident.rca_confidence, 0.0);
        assert_eq!(incident.remediation_risk, RiskLevel::Low);
        assert_eq!(incident.affected_devices, vec!["device-1".to_string()]);
        assert!(incident.events().is_empty());
        assert!(incident.remediation_actions().is_empty());
    }

    #[test]
    fn test_generated_id_format() {
        let id = Incident::generate_id();
        assert!(id.starts_with("INC-"));
        assert_eq!(id.len(), 12);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_fault_type_parsing() {
        assert_eq!("bgp_link_flap".parse::<FaultType>().unwrap(), FaultType::BgpLinkFlap);
        assert_eq!(" CPU_SPIKE ".parse::<FaultType>().unwrap(), FaultType::CpuSpike);
        assert_eq!("power_supply".parse::<FaultType>().unwrap(), FaultType::Unknown);

        let parsed: FaultType = serde_json::from_str("\"fan_failure\"").unwrap();
        assert_eq!(parsed, FaultType::Unknown);
    }

    #[test]
    fn test_forward_transitions_and_retry_loop() {
        let mut incident = Incident::new("INC-1", device(), FaultType::BgpLinkFlap, Severity::High);
        for next in [Stage::Rca, Stage::Remediation, Stage::Verification, Stage::Rca] {
            incident.advance(next).unwrap();
        }
        assert_eq!(incident.stage(), Stage::Rca);
    }

    #[test]
    fn test_backward_transitions_rejected() {
        use Stage::*;
        let illegal = [
            (Rca, Detection),
            (Remediation, Rca),
            (Verification, Remediation),
            (Verification, Detection),
            (Detection, Remediation),
            (Rca, Verification),
            (Resolved, Rca),
            (FailedExhausted, Verification),
            (Detection, FailedExhausted),
        ];
        for (from, to) in illegal {
            assert!(!from.can_transition_to(to), "{from} -> {to} should be illegal");
        }
    }

    #[test]
    fn test_advance_reports_illegal_transition() {
        let mut incident = Incident::new("INC-1", device(), FaultType::BgpLinkFlap, Severity::High);
        let err = incident.advance(Stage::Verification).unwrap_err();
        assert_eq!(
            err,
            IllegalTransition {
                from: Stage::Detection,
                to: Stage::Verification
            }
        );
        assert_eq!(incident.stage(), Stage::Detection);
    }

    #[test]
    fn test_terminal_stages() {
        for stage in [
            Stage::Resolved,
            Stage::FailedUnconfirmed,
            Stage::FailedNoAction,
            Stage::FailedExhausted,
            Stage::FailedError,
        ] {
            assert!(stage.is_terminal());
        }
        assert!(!Stage::Verification.is_terminal());
    }
}
