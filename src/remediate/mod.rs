//! Remediation stage and emergency rollback.

pub mod executor;
pub mod playbook;

use std::time::Duration;

use serde_json::json;

pub use self::executor::{ExecutionReport, RemediationExecutor};
pub use self::playbook::{playbook_for, ActionKind, PlaybookAction};
pub use crate::incident::ActionFailure;

use crate::incident::timeline::{Agent, DiagnosticLogEntry, EventAction, EventRecord, LogType};
use crate::incident::{Incident, RemediationActionResult, Stage};
use crate::tools::Toolset;

#[derive(Debug, Clone)]
pub struct RemediationUpdate {
    pub actions: Vec<RemediationActionResult>,
    pub elapsed: Duration,
    pub events: Vec<EventRecord>,
    pub logs: Vec<DiagnosticLogEntry>,
}

/// Execute the fault's playbook. Always produces a result, partial or not.
pub async fn run(incident: &Incident, tools: &Toolset, settle: Duration) -> RemediationUpdate {
    let playbook = playbook_for(incident.fault_type);
    let report = RemediationExecutor::new(tools, settle)
        .execute(&incident.device, incident.remediation_risk, &playbook)
        .await;

    let action = if report.all_succeeded {
        EventAction::RemediationComplete
    } else {
        EventAction::RemediationPartial
    };
    let event = EventRecord::new(Stage::Remediation, Agent::RemediationAgent, action)
        .with_details(json!({
            "actions_attempted": report.actions.len(),
            "actions_succeeded": report.succeeded(),
            "aborted": report.aborted,
            "total_time": report.elapsed.as_secs_f64(),
        }));

    let logs = report
        .actions
        .iter()
        .map(|a| {
            DiagnosticLogEntry::new(
                Stage::Remediation,
                Agent::RemediationAgent,
                LogType::ToolCall,
                format!("Executed {}", a.action_type),
                json!({
                    "command": a.command,
                    "success": a.success,
                    "output": a.output,
                    "error": a.error,
                }),
            )
        })
        .collect();

    RemediationUpdate {
        actions: report.actions,
        elapsed: report.elapsed,
        events: vec![event],
        logs,
    }
}

#[derive(Debug, Clone)]
pub struct RollbackUpdate {
    pub actions: Vec<RemediationActionResult>,
    pub events: Vec<EventRecord>,
}

/// Revert what can be reverted from `attempt`, the actions of the latest
/// remediation pass.
pub async fn rollback(
    incident: &Incident,
    attempt: &[RemediationActionResult],
    tools: &Toolset,
) -> RollbackUpdate {
    let actions = RemediationExecutor::new(tools, Duration::ZERO)
        .rollback(&incident.device, attempt)
        .await;

    let event = EventRecord::new(
        Stage::Remediation,
        Agent::RemediationAgent,
        EventAction::EmergencyRollback,
    )
    .with_details(json!({
            "rollback_actions": actions.len(),
            "reason": "verification_failed",
        }));

    RollbackUpdate {
        actions,
        events: vec![event],
    }
}
