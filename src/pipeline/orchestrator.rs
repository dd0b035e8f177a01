//! The healing state machine.
//!
//! Drives one incident through Detection, RCA, Remediation and
//! Verification, merging each stage's partial update into the incident and
//! applying the guards between stages. Anything that goes wrong inside a
//! stage, a collaborator panic included, ends the run in `failed_error`;
//! [`Orchestrator::run`] itself never fails.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;
use tokio::time::error::Elapsed;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::enrichment::{self, HypothesisEnricher, RuleBasedEnricher};
use super::guards::{self, VerificationDecision};
use super::PipelineError;
use crate::config::PipelineConfig;
use crate::incident::timeline::{Agent, DiagnosticLogEntry, EventAction, EventRecord, LogType};
use crate::incident::{Incident, Outcome, Stage};
use crate::tools::Toolset;
use crate::{analysis, detect, remediate, verify};

pub struct Orchestrator {
    tools: Toolset,
    enricher: Arc<dyn HypothesisEnricher>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(tools: Toolset, config: PipelineConfig) -> Self {
        Self {
            tools,
            enricher: Arc::new(RuleBasedEnricher),
            config,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn HypothesisEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn enricher_name(&self) -> &'static str {
        self.enricher.name()
    }

    pub fn tools(&self) -> &Toolset {
        &self.tools
    }

    /// Run `incident` to a terminal stage and hand it back.
    pub async fn run(&self, mut incident: Incident) -> Incident {
        info!(
            incident = %incident.id,
            device = %incident.device.name,
            device_type = %incident.device.device_type,
            fault = %incident.claimed_fault,
            severity = %incident.severity,
            "healing workflow started"
        );

        let result = AssertUnwindSafe(self.drive(&mut incident))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => Self::fail(&mut incident, &e),
            Err(payload) => {
                let err = PipelineError::panicked(incident.stage(), &*payload);
                Self::fail(&mut incident, &err);
            }
        }

        info!(
            incident = %incident.id,
            stage = %incident.stage(),
            retries = incident.retry_count,
            "healing workflow finished"
        );
        incident
    }

    /// Record an unhandled failure as terminal data.
    pub fn fail(incident: &mut Incident, err: &PipelineError) {
        let message = err.to_string();
        error!(
            incident = %incident.id,
            stage = %incident.stage(),
            error = %message,
            "workflow failed"
        );
        incident.fail_with_error(message.clone());
        incident.record(
            EventRecord::new(Stage::FailedError, Agent::Orchestrator, EventAction::WorkflowError)
                .with_details(json!({ "error": message })),
        );
    }

    async fn drive(&self, incident: &mut Incident) -> Result<(), PipelineError> {
        // Index of the first action recorded by the latest remediation pass.
        let mut attempt_start = 0;
        loop {
            match incident.stage() {
                Stage::Detection => self.detection(incident).await?,
                Stage::Rca => self.rca(incident).await?,
                Stage::Remediation => {
                    attempt_start = incident.remediation_actions().len();
                    self.remediation(incident).await?;
                }
                Stage::Verification => self.verification(incident, attempt_start).await?,
                _ => return Ok(()),
            }
        }
    }

    /// Deadline for a stage starting now, when a stage timeout is set.
    fn deadline(&self) -> Option<Instant> {
        self.config.stage_timeout().map(|limit| Instant::now() + limit)
    }

    /// Run `fut` against the stage deadline, failing the stage on expiry.
    async fn bounded<T>(
        &self,
        stage: Stage,
        deadline: Option<Instant>,
        fut: impl Future<Output = T>,
    ) -> Result<T, PipelineError> {
        within(deadline, fut).await.map_err(|_| {
            let secs = self.config.stage_timeout_sec.unwrap_or_default();
            warn!(%stage, secs, "stage timed out");
            PipelineError::StageTimeout { stage, secs }
        })
    }

    /// Run an enrichment call against the stage deadline.
    ///
    /// Errors and expiry both fall back to the rule-based narrative.
    async fn enrichment(
        &self,
        stage: Stage,
        deadline: Option<Instant>,
        fut: impl Future<Output = anyhow::Result<Option<String>>>,
    ) -> Option<String> {
        match within(deadline, fut).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(
                    %stage,
                    enricher = self.enricher.name(),
                    error = %e,
                    "enrichment failed, using rule-based"
                );
                None
            }
            Err(_) => {
                warn!(
                    %stage,
                    enricher = self.enricher.name(),
                    "enrichment hit the stage deadline, using rule-based"
                );
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn detection(&self, incident: &mut Incident) -> Result<(), PipelineError> {
        let deadline = self.deadline();
        let update = self
            .bounded(Stage::Detection, deadline, detect::run(incident, &self.tools))
            .await?;

        incident.fault_type = update.fault_type;
        incident.detection_confidence = update.confidence.clamp(0.0, 1.0);
        incident.detection_method = update.method.as_str().to_string();
        incident.metric_deviations = update.deviations;
        incident.timings.ttd_seconds = update.elapsed.as_secs_f64();
        incident.record_all(update.events);
        incident.log_all(update.logs);

        // Annotation only: the classification below never reads it.
        let narrative = self
            .enrichment(Stage::Detection, deadline, self.enricher.classify(incident))
            .await;
        if let Some(text) = narrative {
            let shown = enrichment::truncate_chars(&text, enrichment::CLASSIFICATION_LIMIT);
            incident.log(DiagnosticLogEntry::new(
                Stage::Detection,
                Agent::DetectionAgent,
                LogType::LlmContext,
                "AI classification",
                json!({ "enricher": self.enricher.name(), "response": shown }),
            ));
            incident.record(
                EventRecord::new(
                    Stage::Detection,
                    Agent::DetectionAgent,
                    EventAction::AiClassification,
                )
                .with_details(json!({ "ai_response": shown })),
            );
        }

        if guards::after_detection(incident.detection_confidence, incident.fault_type) {
            incident.advance(Stage::Rca)?;
            Ok(())
        } else {
            self.finish(incident, Outcome::UnconfirmedDetection)
        }
    }

    async fn rca(&self, incident: &mut Incident) -> Result<(), PipelineError> {
        let deadline = self.deadline();
        let update = self
            .bounded(Stage::Rca, deadline, analysis::run(incident, &self.tools))
            .await?
            .map_err(|e| PipelineError::collaborator(Stage::Rca, e))?;

        let analysis = update.analysis;
        incident.root_cause = analysis.root_cause;
        incident.rca_hypothesis = analysis.hypothesis;
        incident.rca_evidence = analysis.evidence;
        incident.rca_confidence = analysis.confidence.clamp(0.0, 1.0);
        incident.remediation_plan = analysis.plan;
        incident.remediation_risk = analysis.risk;
        incident.affected_devices = update.affected_devices;
        incident.timings.rca_seconds = update.elapsed.as_secs_f64();
        incident.record_all(update.events);
        incident.log_all(update.logs);

        let narrative = self
            .enrichment(Stage::Rca, deadline, self.enricher.analyze(incident))
            .await;
        if let Some(text) = narrative {
            let hypothesis = enrichment::truncate_chars(&text, enrichment::HYPOTHESIS_LIMIT);
            incident.log(DiagnosticLogEntry::new(
                Stage::Rca,
                Agent::RcaAgent,
                LogType::LlmContext,
                "AI root cause narrative",
                json!({ "enricher": self.enricher.name(), "response": hypothesis }),
            ));
            incident.rca_hypothesis = hypothesis;
            incident.record(
                EventRecord::new(Stage::Rca, Agent::RcaAgent, EventAction::AiAnalysisComplete)
                    .with_details(json!({ "ai_response_length": text.chars().count() })),
            );
        }

        if guards::after_rca(incident.rca_confidence, incident.remediation_risk) {
            incident.advance(Stage::Remediation)?;
            Ok(())
        } else {
            self.finish(incident, Outcome::SkippedRemediation)
        }
    }

    async fn remediation(&self, incident: &mut Incident) -> Result<(), PipelineError> {
        let update = self
            .bounded(
                Stage::Remediation,
                self.deadline(),
                remediate::run(incident, &self.tools, self.config.action_settle()),
            )
            .await?;

        incident.push_actions(update.actions);
        incident.timings.ttr_seconds = update.elapsed.as_secs_f64();
        incident.record_all(update.events);
        incident.log_all(update.logs);
        incident.advance(Stage::Verification)?;
        Ok(())
    }

    async fn verification(
        &self,
        incident: &mut Incident,
        attempt_start: usize,
    ) -> Result<(), PipelineError> {
        let deadline = self.deadline();
        let update = self
            .bounded(
                Stage::Verification,
                deadline,
                verify::run(incident, &self.tools, self.config.verification_settle()),
            )
            .await?;

        incident.verification_checks = update.checks;
        incident.verification_passed = update.passed;
        incident.timings.tttr_seconds = update.elapsed.as_secs_f64();
        // Exactly one verification event per attempt lands before the guard reads the log.
        incident.record_all(update.events);
        incident.log_all(update.logs);

        if !update.passed && self.config.rollback_on_failure {
            let attempt = incident.remediation_actions()[attempt_start..].to_vec();
            let rollback = self
                .bounded(
                    Stage::Verification,
                    deadline,
                    remediate::rollback(incident, &attempt, &self.tools),
                )
                .await?;
            info!(
                incident = %incident.id,
                reverted = rollback.actions.len(),
                "emergency rollback"
            );
            incident.push_actions(rollback.actions);
            incident.record_all(rollback.events);
        }

        let prior_failures = incident
            .verification_failures()
            .saturating_sub(usize::from(!update.passed));
        match guards::after_verification(update.passed, prior_failures) {
            VerificationDecision::Resolve => {
                self.observe_stability(incident, deadline).await;
                self.finish(incident, Outcome::Resolved)
            }
            VerificationDecision::Exhaust => self.finish(incident, Outcome::VerificationExhausted),
            VerificationDecision::Retry => {
                incident.retry_count += 1;
                let derived = incident.verification_failures();
                if derived != incident.retry_count as usize {
                    warn!(
                        incident = %incident.id,
                        retry_count = incident.retry_count,
                        derived,
                        "retry counter diverged from timeline"
                    );
                }
                warn!(
                    incident = %incident.id,
                    attempt = incident.retry_count,
                    "verification failed, retrying RCA"
                );
                incident.record(
                    EventRecord::new(
                        Stage::Verification,
                        Agent::Orchestrator,
                        EventAction::RetryScheduled,
                    )
                    .with_details(json!({
                        "retry": incident.retry_count,
                        "prior_failures": prior_failures,
                    })),
                );
                incident.advance(Stage::Rca)?;
                Ok(())
            }
        }
    }

    /// Score how steadily a verified fix holds, when a window is configured.
    async fn observe_stability(&self, incident: &mut Incident, deadline: Option<Instant>) {
        let Some(window) = self.config.stability_window() else {
            return;
        };
        let interval = self.config.stability_interval();
        let observed = within(
            deadline,
            verify::observe(incident, &self.tools, window, interval),
        )
        .await;
        match observed {
            Ok((report, event, log)) => {
                if !report.stable {
                    warn!(
                        incident = %incident.id,
                        score = report.stability_score,
                        "fix verified but not yet stable"
                    );
                }
                incident.record(event);
                incident.log(log);
            }
            Err(_) => warn!(
                incident = %incident.id,
                "stability window outlasted the stage deadline"
            ),
        }
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    fn finish(&self, incident: &mut Incident, outcome: Outcome) -> Result<(), PipelineError> {
        let (stage, action, details, error) = match outcome {
            Outcome::UnconfirmedDetection => (
                Stage::Detection,
                EventAction::IncidentUnconfirmed,
                json!({
                    "reason": "Low detection confidence or unknown fault type",
                    "confidence": incident.detection_confidence,
                }),
                Some("Incident could not be confirmed with sufficient confidence"),
            ),
            Outcome::SkippedRemediation => (
                Stage::Rca,
                EventAction::RemediationSkipped,
                json!({
                    "reason": "Low RCA confidence or high risk",
                    "rca_confidence": incident.rca_confidence,
                    "risk": incident.remediation_risk,
                }),
                Some("Remediation skipped due to low confidence or high risk"),
            ),
            Outcome::Resolved => {
                let t = incident.timings;
                (
                    Stage::Resolved,
                    EventAction::IncidentResolved,
                    json!({
                        "total_time": t.total(),
                        "ttd": t.ttd_seconds,
                        "ttr": t.ttr_seconds,
                        "tttr": t.tttr_seconds,
                        "fault_type": incident.fault_type,
                        "root_cause": incident.root_cause,
                    }),
                    None,
                )
            }
            Outcome::VerificationExhausted => (
                Stage::FailedExhausted,
                EventAction::IncidentFailed,
                json!({
                    "reason": "Verification failed after multiple attempts",
                    "fault_type": incident.fault_type,
                    "actions_taken": incident.remediation_actions().len(),
                }),
                Some("Automated remediation unsuccessful, escalating to human operator"),
            ),
            Outcome::UnhandledPipelineError => {
                return Err(PipelineError::WorkerLost(
                    "error outcome reached without an error".into(),
                ));
            }
        };

        incident.advance(outcome.terminal_stage())?;
        incident.outcome = Some(outcome);
        incident.error = error.map(str::to_string);
        incident.record(EventRecord::new(stage, Agent::Orchestrator, action).with_details(details));

        match outcome {
            Outcome::Resolved => info!(
                incident = %incident.id,
                total = incident.timings.total(),
                "incident resolved"
            ),
            _ => warn!(incident = %incident.id, outcome = ?outcome, "incident not resolved"),
        }
        Ok(())
    }
}

/// Await `fut`, giving up at `deadline` when one is set.
async fn within<T>(deadline: Option<Instant>, fut: impl Future<Output = T>) -> Result<T, Elapsed> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await,
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{DeviceRef, FaultType, Severity};
    use crate::tools::{Anomaly, MetricSample};

    fn incident(fault: FaultType) -> Incident {
        let device = DeviceRef {
            id: "device-1".into(),
            name: "core-1".into(),
            device_type: "core".into(),
        };
        Incident::new("INC-ORCH", device, fault, Severity::High)
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Toolset::simulated(), PipelineConfig::immediate())
    }

    #[tokio::test]
    async fn test_lab_link_flap_resolves() {
        let done = orchestrator().run(incident(FaultType::BgpLinkFlap)).await;
        assert_eq!(done.stage(), Stage::Resolved);
        assert_eq!(done.outcome, Some(Outcome::Resolved));
        assert!(done.error.is_none());
        assert_eq!(done.retry_count, 0);
        let last = done.events().last().unwrap();
        assert_eq!(last.action, EventAction::IncidentResolved);
        assert_eq!(last.details["fault_type"], "bgp_link_flap");
    }

    #[tokio::test]
    async fn test_finish_rejects_error_outcome() {
        let orch = orchestrator();
        let mut inc = incident(FaultType::CpuSpike);
        let err = orch.finish(&mut inc, Outcome::UnhandledPipelineError).unwrap_err();
        assert!(matches!(err, PipelineError::WorkerLost(_)));
        assert_eq!(inc.stage(), Stage::Detection);
    }

    #[tokio::test]
    async fn test_fail_records_workflow_error() {
        let mut inc = incident(FaultType::CpuSpike);
        let err = PipelineError::StageTimeout {
            stage: Stage::Detection,
            secs: 5,
        };
        Orchestrator::fail(&mut inc, &err);
        assert_eq!(inc.stage(), Stage::FailedError);
        assert_eq!(inc.outcome, Some(Outcome::UnhandledPipelineError));
        let event = inc.events().last().unwrap();
        assert_eq!(event.action, EventAction::WorkflowError);
        assert_eq!(event.details["error"], "detection stage exceeded its 5s timeout");
    }

    struct PanickingMetrics;

    #[async_trait::async_trait]
    impl crate::tools::MetricsQuery for PanickingMetrics {
        async fn query(&self, _device_id: &str, _expr: &str) -> anyhow::Result<MetricSample> {
            Ok(MetricSample::no_data())
        }

        async fn scan_anomalies(&self, _device_id: &str) -> anyhow::Result<Vec<Anomaly>> {
            panic!("metrics backend exploded");
        }
    }

    #[tokio::test]
    async fn test_collaborator_panic_becomes_failed_error() {
        let simulated = Toolset::simulated();
        let tools = Toolset::new(Arc::new(PanickingMetrics), simulated.device, simulated.topology);
        let orch = Orchestrator::new(tools, PipelineConfig::immediate());

        let done = orch.run(incident(FaultType::CpuSpike)).await;

        assert_eq!(done.stage(), Stage::FailedError);
        assert_eq!(done.outcome, Some(Outcome::UnhandledPipelineError));
        assert_eq!(
            done.error.as_deref(),
            Some("detection stage panicked: metrics backend exploded")
        );
        let event = done.events().last().unwrap();
        assert_eq!(event.action, EventAction::WorkflowError);
        assert_eq!(event.stage, Stage::FailedError);
    }

    #[tokio::test]
    async fn test_stability_window_annotates_resolution() {
        let config = PipelineConfig {
            stability_window_ms: Some(20),
            stability_interval_ms: 5,
            ..PipelineConfig::immediate()
        };
        let done = Orchestrator::new(Toolset::simulated(), config)
            .run(incident(FaultType::BgpLinkFlap))
            .await;

        assert_eq!(done.stage(), Stage::Resolved);
        let actions: Vec<_> = done.events().iter().map(|e| e.action).collect();
        let observed = actions
            .iter()
            .position(|a| *a == EventAction::StabilityObserved)
            .unwrap();
        assert_eq!(actions[observed + 1], EventAction::IncidentResolved);
        assert_eq!(done.events()[observed].details["stable"], true);
    }

    #[tokio::test]
    async fn test_no_stability_window_skips_observation() {
        let done = orchestrator().run(incident(FaultType::BgpLinkFlap)).await;
        let observed = done
            .events()
            .iter()
            .filter(|e| e.action == EventAction::StabilityObserved)
            .count();
        assert_eq!(observed, 0);
    }
}
