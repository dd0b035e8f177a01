//! Append-only incident timeline.
//!
//! Every stage records what it decided and did as [`EventRecord`]s, plus
//! finer-grained [`DiagnosticLogEntry`] records for operator transparency.
//! The [`Timeline`] only exposes append and read operations; ordering is
//! insertion order and the orchestrator derives its retry count from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Stage;

// ---------------------------------------------------------------------------
// Agents and actions
// ---------------------------------------------------------------------------

/// The pipeline component that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Agent {
    Orchestrator,
    DetectionAgent,
    #[serde(rename = "RCAAgent")]
    RcaAgent,
    RemediationAgent,
    VerificationAgent,
}

/// Tag describing what happened. Serialized in snake_case on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Detection finished with confidence above 0.5.
    FaultConfirmed,
    /// Detection finished with confidence at or below 0.5.
    FaultAnalysis,
    /// Narrative classification text from the enrichment capability.
    AiClassification,
    RootCauseIdentified,
    /// The RCA hypothesis text was replaced by an enrichment narrative.
    AiAnalysisComplete,
    RemediationComplete,
    RemediationPartial,
    EmergencyRollback,
    VerificationPassed,
    VerificationFailed,
    /// Repeated verification after a pass, with its stability score.
    StabilityObserved,
    /// Verification failed and the pipeline loops back to RCA.
    RetryScheduled,
    IncidentUnconfirmed,
    RemediationSkipped,
    IncidentResolved,
    IncidentFailed,
    WorkflowError,
}

// ---------------------------------------------------------------------------
// EventRecord
// ---------------------------------------------------------------------------

/// A single timestamped timeline record. Never edited once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub agent: Agent,
    pub action: EventAction,
    pub details: serde_json::Value,
}

impl EventRecord {
    /// Create a record stamped with the current time and empty details.
    pub fn new(stage: Stage, agent: Agent, action: EventAction) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            agent,
            action,
            details: serde_json::Value::Object(Default::default()),
        }
    }

    /// Builder-style setter for `details`.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

// ---------------------------------------------------------------------------
// DiagnosticLogEntry
// ---------------------------------------------------------------------------

/// Category of a diagnostic log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    NetworkData,
    LlmContext,
    Decision,
    ToolCall,
    Reasoning,
}

/// Detailed internal record of what a stage saw or called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticLogEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub agent: Agent,
    pub log_type: LogType,
    pub title: String,
    pub content: serde_json::Value,
}

impl DiagnosticLogEntry {
    pub fn new(
        stage: Stage,
        agent: Agent,
        log_type: LogType,
        title: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            agent,
            log_type,
            title: title.into(),
            content,
        }
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Append-only pair of event and diagnostic sequences.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline {
    events: Vec<EventRecord>,
    internal_logs: Vec<DiagnosticLogEntry>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, event: EventRecord) {
        self.events.push(event);
    }

    /// Append a batch produced by a stage, preserving its order.
    pub fn extend_events(&mut self, events: impl IntoIterator<Item = EventRecord>) {
        self.events.extend(events);
    }

    pub fn push_log(&mut self, entry: DiagnosticLogEntry) {
        self.internal_logs.push(entry);
    }

    pub fn extend_logs(&mut self, entries: impl IntoIterator<Item = DiagnosticLogEntry>) {
        self.internal_logs.extend(entries);
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn internal_logs(&self) -> &[DiagnosticLogEntry] {
        &self.internal_logs
    }

    /// Number of events carrying the given action tag.
    pub fn count(&self, action: EventAction) -> usize {
        self.events.iter().filter(|e| e.action == action).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timeline_preserves_insertion_order() {
        let mut timeline = Timeline::new();
        timeline.push_event(EventRecord::new(
            Stage::Detection,
            Agent::DetectionAgent,
            EventAction::FaultConfirmed,
        ));
        timeline.extend_events([
            EventRecord::new(
                Stage::Verification,
                Agent::VerificationAgent,
                EventAction::VerificationFailed,
            ),
            EventRecord::new(
                Stage::Verification,
                Agent::VerificationAgent,
                EventAction::VerificationFailed,
            ),
        ]);

        let actions: Vec<_> = timeline.events().iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                EventAction::FaultConfirmed,
                EventAction::VerificationFailed,
                EventAction::VerificationFailed
            ]
        );
        assert_eq!(timeline.count(EventAction::VerificationFailed), 2);
        assert_eq!(timeline.count(EventAction::IncidentResolved), 0);
    }

    #[test]
    fn test_event_serializes_wire_names() {
        let event = EventRecord::new(Stage::Rca, Agent::RcaAgent, EventAction::RootCauseIdentified)
            .with_details(json!({ "confidence": 0.75 }));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["stage"], "rca");
        assert_eq!(value["agent"], "RCAAgent");
        assert_eq!(value["action"], "root_cause_identified");
        assert_eq!(value["details"]["confidence"], 0.75);
    }
}
