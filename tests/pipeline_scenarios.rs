//! End-to-end pipeline runs against scripted collaborators.

use std::sync::Arc;

use anyhow::Result;
use netheal::config::PipelineConfig;
use netheal::incident::timeline::{EventAction, LogType};
use netheal::incident::{
    AnomalySeverity, DeviceRef, FaultType, Incident, Outcome, RiskLevel, Severity, Stage,
};
use netheal::pipeline::guards;
use netheal::pipeline::{HypothesisEnricher, Orchestrator};
use netheal::tools::simulated::{SimulatedDevice, SimulatedMetrics, SimulatedTopology};
use netheal::tools::{Anomaly, CommandOutput, DeviceCommand, DeviceCommandKind, Toolset};

fn core_device() -> DeviceRef {
    DeviceRef {
        id: "device-1".into(),
        name: "core-1".into(),
        device_type: "core".into(),
    }
}

fn incident(fault: FaultType) -> Incident {
    Incident::new(Incident::generate_id(), core_device(), fault, Severity::High)
}

fn critical(metric: &str, value: f64) -> Anomaly {
    Anomaly {
        metric: metric.into(),
        severity: AnomalySeverity::Critical,
        value,
        description: format!("{metric} anomaly"),
    }
}

fn tools(metrics: SimulatedMetrics, device: SimulatedDevice) -> Toolset {
    Toolset::new(Arc::new(metrics), Arc::new(device), Arc::new(SimulatedTopology::lab()))
}

fn count(incident: &Incident, action: EventAction) -> usize {
    incident.events().iter().filter(|e| e.action == action).count()
}

async fn run(tools: Toolset, config: PipelineConfig, fault: FaultType) -> Incident {
    Orchestrator::new(tools, config).run(incident(fault)).await
}

/// Failing CPU fault: detection and RCA pass, verification never does.
fn stuck_cpu() -> Toolset {
    tools(
        SimulatedMetrics::new()
            .with_anomalies(vec![critical("cpu_utilization", 97.0)])
            .with_value("cpu_utilization", "97"),
        SimulatedDevice::new(),
    )
}

// ---------------------------------------------------------------------------
// Link flap resolves
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_link_flap_resolves() {
    let device = Arc::new(SimulatedDevice::lab());
    let tools = Toolset::new(
        Arc::new(
            SimulatedMetrics::new()
                .with_anomalies(vec![critical("bgp_session_state", 0.0)])
                .with_value("bgp_session_state", "1")
                .with_value("bgp_flap_count_1m", "0"),
        ),
        device.clone(),
        Arc::new(SimulatedTopology::lab()),
    );

    let done = run(tools, PipelineConfig::immediate(), FaultType::BgpLinkFlap).await;

    assert!(done.detection_confidence >= 0.5);
    assert_eq!(done.fault_type, FaultType::BgpLinkFlap);
    assert_eq!(done.detection_method, "metric_anomaly_detection");
    assert!(done.remediation_plan.iter().any(|s| s.contains("BGP hold timer")));
    assert!(matches!(done.remediation_risk, RiskLevel::Low | RiskLevel::Medium));
    assert_eq!(done.rca_evidence.len(), 3);
    assert!((done.rca_confidence - 0.75).abs() < 1e-9);

    assert_eq!(done.remediation_actions().len(), 2);
    assert!(done.remediation_actions().iter().all(|a| a.success));
    // Two diagnostics plus two playbook commands.
    assert_eq!(device.executed().len(), 4);

    assert!(done.verification_passed);
    assert_eq!(done.stage(), Stage::Resolved);
    assert_eq!(done.outcome, Some(Outcome::Resolved));
    assert_eq!(done.retry_count, 0);

    let actions: Vec<_> = done.events().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            EventAction::FaultConfirmed,
            EventAction::RootCauseIdentified,
            EventAction::RemediationComplete,
            EventAction::VerificationPassed,
            EventAction::IncidentResolved,
        ]
    );
    let resolved = done.events().last().unwrap();
    let total = resolved.details["total_time"].as_f64().unwrap();
    let t = done.timings;
    assert!((total - (t.ttd_seconds + t.ttr_seconds + t.tttr_seconds)).abs() < 1e-9);
}

#[tokio::test]
async fn test_lab_fixture_resolves() {
    let done = run(Toolset::simulated(), PipelineConfig::immediate(), FaultType::BgpLinkFlap).await;
    assert_eq!(done.stage(), Stage::Resolved);
    assert_eq!(done.verification_checks.len(), 4);
}

// ---------------------------------------------------------------------------
// Unknown claim without evidence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_fault_unconfirmed() {
    let done = run(
        tools(SimulatedMetrics::new(), SimulatedDevice::new()),
        PipelineConfig::immediate(),
        FaultType::Unknown,
    )
    .await;

    assert!((done.detection_confidence - 0.1).abs() < 1e-9);
    assert_eq!(done.fault_type, FaultType::Unknown);
    assert_eq!(done.detection_method, "proactive_analysis");
    assert_eq!(done.stage(), Stage::FailedUnconfirmed);
    assert_eq!(done.outcome, Some(Outcome::UnconfirmedDetection));
    assert_eq!(
        done.error.as_deref(),
        Some("Incident could not be confirmed with sufficient confidence")
    );

    assert_eq!(count(&done, EventAction::RootCauseIdentified), 0);
    assert_eq!(count(&done, EventAction::RemediationComplete), 0);
    assert_eq!(count(&done, EventAction::RemediationPartial), 0);
    assert!(done.remediation_actions().is_empty());
    assert_eq!(done.events().last().unwrap().action, EventAction::IncidentUnconfirmed);
}

// ---------------------------------------------------------------------------
// Remediation withheld
// ---------------------------------------------------------------------------

#[test]
fn test_high_risk_needs_high_confidence() {
    assert!(!guards::after_rca(0.5, RiskLevel::High));
    assert!(guards::after_rca(0.5, RiskLevel::Medium));
}

#[tokio::test]
async fn test_low_rca_confidence_skips_remediation() {
    // The claim alone confirms detection; without deviations or diagnostic
    // evidence RCA stays at its 0.3 floor.
    let device = Arc::new(SimulatedDevice::new());
    let tools = Toolset::new(
        Arc::new(SimulatedMetrics::new()),
        device.clone(),
        Arc::new(SimulatedTopology::lab()),
    );
    let done = run(tools, PipelineConfig::immediate(), FaultType::CpuSpike).await;

    assert_eq!(done.detection_method, "operator_reported");
    assert!((done.rca_confidence - 0.3).abs() < 1e-9);
    assert_eq!(done.stage(), Stage::FailedNoAction);
    assert_eq!(done.outcome, Some(Outcome::SkippedRemediation));
    assert!(done.remediation_actions().is_empty());
    // Only the two RCA diagnostics reached the device.
    assert_eq!(device.executed().len(), 2);

    let last = done.events().last().unwrap();
    assert_eq!(last.action, EventAction::RemediationSkipped);
    assert_eq!(last.details["reason"], "Low RCA confidence or high risk");
}

// ---------------------------------------------------------------------------
// Bounded retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_three_failures_exhaust() {
    let done = run(stuck_cpu(), PipelineConfig::immediate(), FaultType::CpuSpike).await;

    assert_eq!(done.stage(), Stage::FailedExhausted);
    assert_eq!(done.outcome, Some(Outcome::VerificationExhausted));
    assert_eq!(done.retry_count, 2);
    assert_eq!(done.verification_failures(), 3);
    assert_eq!(count(&done, EventAction::RetryScheduled), 2);
    assert_eq!(count(&done, EventAction::RootCauseIdentified), 3);
    assert_eq!(done.remediation_actions().len(), 6);

    let actions: Vec<_> = done.events().iter().map(|e| e.action).collect();
    let last_failure = actions
        .iter()
        .rposition(|a| *a == EventAction::VerificationFailed)
        .unwrap();
    let before = actions[..last_failure]
        .iter()
        .filter(|a| **a == EventAction::VerificationFailed)
        .count();
    assert_eq!(before, 2);
    assert_eq!(actions.last(), Some(&EventAction::IncidentFailed));
    assert_eq!(done.events().last().unwrap().details["actions_taken"], 6);
}

#[tokio::test]
async fn test_retry_then_pass() {
    // Detection reads cpu_utilization once before verification does.
    let tools = tools(
        SimulatedMetrics::new()
            .with_anomalies(vec![critical("cpu_utilization", 97.0)])
            .with_sequence("cpu_utilization", ["97", "97", "40"]),
        SimulatedDevice::new(),
    );
    let done = run(tools, PipelineConfig::immediate(), FaultType::CpuSpike).await;

    assert_eq!(done.stage(), Stage::Resolved);
    assert_eq!(done.retry_count, 1);
    assert_eq!(count(&done, EventAction::VerificationFailed), 1);
    assert_eq!(count(&done, EventAction::VerificationPassed), 1);
    assert_eq!(done.remediation_actions().len(), 4);
}

#[tokio::test]
async fn test_rollback_runs_per_failed_verification() {
    let config = PipelineConfig {
        rollback_on_failure: true,
        ..PipelineConfig::immediate()
    };
    let done = run(stuck_cpu(), config, FaultType::CpuSpike).await;

    assert_eq!(done.stage(), Stage::FailedExhausted);
    assert_eq!(count(&done, EventAction::EmergencyRollback), 3);
    // CPU playbook actions have no inverse.
    assert!(done.remediation_actions().iter().all(|a| a.rollback_of.is_none()));
}

// ---------------------------------------------------------------------------
// Unhandled failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_device_error_becomes_failed_error() {
    let tools = tools(
        SimulatedMetrics::new().with_anomalies(vec![critical("cpu_utilization", 97.0)]),
        SimulatedDevice::new().with_error("show bgp summary", "ssh: connection refused"),
    );
    let done = run(tools, PipelineConfig::immediate(), FaultType::CpuSpike).await;

    assert_eq!(done.stage(), Stage::FailedError);
    assert_eq!(done.outcome, Some(Outcome::UnhandledPipelineError));
    let error = done.error.clone().unwrap();
    assert!(error.starts_with("rca stage failed"));
    assert!(error.contains("ssh: connection refused"));

    let last = done.events().last().unwrap();
    assert_eq!(last.action, EventAction::WorkflowError);
    assert_eq!(last.details["error"], error);
}

struct StalledDevice;

#[async_trait::async_trait]
impl DeviceCommand for StalledDevice {
    async fn execute(
        &self,
        _device_id: &str,
        _command: &DeviceCommandKind,
    ) -> Result<CommandOutput> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_stage_timeout_becomes_failed_error() {
    let tools = Toolset::new(
        Arc::new(
            SimulatedMetrics::new().with_anomalies(vec![critical("cpu_utilization", 97.0)]),
        ),
        Arc::new(StalledDevice),
        Arc::new(SimulatedTopology::lab()),
    );
    let config = PipelineConfig {
        stage_timeout_sec: Some(1),
        ..PipelineConfig::immediate()
    };
    let done = run(tools, config, FaultType::CpuSpike).await;

    assert_eq!(done.stage(), Stage::FailedError);
    assert_eq!(done.error.as_deref(), Some("rca stage exceeded its 1s timeout"));
}

#[tokio::test]
async fn test_collaborator_trouble_in_detection_is_not_fatal() {
    let tools = Toolset::new(
        Arc::new(SimulatedMetrics::new().with_scan_error("prometheus unreachable")),
        Arc::new(SimulatedDevice::new()),
        Arc::new(SimulatedTopology::new().with_lookup_error("gns3 unreachable")),
    );
    let done = run(tools, PipelineConfig::immediate(), FaultType::Unknown).await;
    assert_eq!(done.stage(), Stage::FailedUnconfirmed);
    assert!(done.error.is_some());
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

struct ScriptedEnricher {
    text: Option<String>,
}

#[async_trait::async_trait]
impl HypothesisEnricher for ScriptedEnricher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn classify(&self, _incident: &Incident) -> Result<Option<String>> {
        match &self.text {
            Some(text) => Ok(Some(text.clone())),
            None => anyhow::bail!("model offline"),
        }
    }

    async fn analyze(&self, incident: &Incident) -> Result<Option<String>> {
        self.classify(incident).await
    }
}

#[tokio::test]
async fn test_enrichment_annotates_without_steering() {
    let narrative = "x".repeat(1500);
    let orchestrator = Orchestrator::new(Toolset::simulated(), PipelineConfig::immediate())
        .with_enricher(Arc::new(ScriptedEnricher {
            text: Some(narrative),
        }));
    let baseline = Orchestrator::new(Toolset::simulated(), PipelineConfig::immediate())
        .run(incident(FaultType::BgpLinkFlap))
        .await;
    let done = orchestrator.run(incident(FaultType::BgpLinkFlap)).await;

    assert_eq!(done.stage(), Stage::Resolved);
    assert_eq!(done.detection_confidence, baseline.detection_confidence);
    assert_eq!(done.rca_confidence, baseline.rca_confidence);
    assert_eq!(done.remediation_risk, baseline.remediation_risk);
    assert_eq!(done.remediation_plan, baseline.remediation_plan);
    assert_eq!(done.rca_hypothesis.chars().count(), 1000);

    let classification = done
        .events()
        .iter()
        .find(|e| e.action == EventAction::AiClassification)
        .unwrap();
    assert_eq!(classification.details["ai_response"].as_str().unwrap().len(), 500);
    assert_eq!(count(&done, EventAction::AiAnalysisComplete), 1);

    let narratives: Vec<_> = done
        .timeline()
        .internal_logs()
        .iter()
        .filter(|log| log.log_type == LogType::LlmContext)
        .collect();
    assert_eq!(narratives.len(), 2);
    assert_eq!(narratives[0].stage, Stage::Detection);
    assert_eq!(narratives[0].content["enricher"], "scripted");
    assert_eq!(narratives[1].stage, Stage::Rca);
    assert_eq!(narratives[1].content["response"].as_str().unwrap().len(), 1000);
}

#[tokio::test]
async fn test_failing_enrichment_falls_back() {
    let orchestrator = Orchestrator::new(Toolset::simulated(), PipelineConfig::immediate())
        .with_enricher(Arc::new(ScriptedEnricher { text: None }));
    let done = orchestrator.run(incident(FaultType::BgpLinkFlap)).await;

    assert_eq!(done.stage(), Stage::Resolved);
    assert_eq!(count(&done, EventAction::AiClassification), 0);
    assert_eq!(count(&done, EventAction::AiAnalysisComplete), 0);
    assert!(!done.rca_hypothesis.is_empty());
    assert!(done
        .timeline()
        .internal_logs()
        .iter()
        .all(|log| log.log_type != LogType::LlmContext));
}

/// Never answers.
struct SilentEnricher;

#[async_trait::async_trait]
impl HypothesisEnricher for SilentEnricher {
    fn name(&self) -> &'static str {
        "silent"
    }

    async fn classify(&self, _incident: &Incident) -> Result<Option<String>> {
        std::future::pending().await
    }

    async fn analyze(&self, _incident: &Incident) -> Result<Option<String>> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_stalled_enrichment_is_cut_off_at_stage_deadline() {
    let config = PipelineConfig {
        stage_timeout_sec: Some(1),
        ..PipelineConfig::immediate()
    };
    let done = Orchestrator::new(Toolset::simulated(), config)
        .with_enricher(Arc::new(SilentEnricher))
        .run(incident(FaultType::BgpLinkFlap))
        .await;

    assert_eq!(done.stage(), Stage::Resolved);
    assert!(done.error.is_none());
    assert_eq!(count(&done, EventAction::AiClassification), 0);
    assert_eq!(count(&done, EventAction::AiAnalysisComplete), 0);
}
