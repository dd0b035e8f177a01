//! RCA stage: gather device diagnostics and run the root-cause engine.

pub mod knowledge;
pub mod rca;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

pub use self::rca::{Diagnostics, RootCauseAnalysis, RootCauseEngine};

use crate::incident::timeline::{Agent, DiagnosticLogEntry, EventAction, EventRecord, LogType};
use crate::incident::{Incident, Stage};
use crate::tools::{DeviceCommandKind, Toolset};

/// Partial incident update produced by RCA.
#[derive(Debug, Clone)]
pub struct RcaUpdate {
    pub analysis: RootCauseAnalysis,
    pub affected_devices: Vec<String>,
    pub elapsed: Duration,
    pub events: Vec<EventRecord>,
    pub logs: Vec<DiagnosticLogEntry>,
}

async fn show(tools: &Toolset, device_id: &str, command: &str) -> Result<String> {
    let output = tools
        .device
        .execute(device_id, &DeviceCommandKind::raw(command))
        .await
        .with_context(|| format!("device command '{command}' failed"))?;
    // An unsuccessful command contributes no evidence.
    Ok(if output.success { output.output } else { String::new() })
}

/// Device errors surface as `Err`; the orchestrator turns them into a
/// terminal failure.
pub async fn run(incident: &Incident, tools: &Toolset) -> Result<RcaUpdate> {
    let started = Instant::now();
    let device = &incident.device;
    info!(incident = %incident.id, fault = %incident.fault_type, "rca started");

    let diagnostics = Diagnostics {
        bgp_summary: show(tools, &device.id, "show bgp summary").await?,
        interface_status: show(tools, &device.id, "show interface status").await?,
    };

    let analysis = RootCauseEngine::new().analyze(
        incident.fault_type,
        &incident.metric_deviations,
        &diagnostics,
    );
    // Cross-device correlation is out of scope; only the originating device.
    let affected_devices = vec![device.name.clone()];

    let suggested = knowledge::lookup(incident.fault_type)
        .map(|k| {
            json!({
                "diagnostic_commands": k.diagnostic_commands,
                "remediation_options": k.remediation_options,
            })
        })
        .unwrap_or_else(|| json!({}));

    let logs = vec![
        DiagnosticLogEntry::new(
            Stage::Rca,
            Agent::RcaAgent,
            LogType::ToolCall,
            "Device diagnostics",
            json!(diagnostics),
        ),
        DiagnosticLogEntry::new(
            Stage::Rca,
            Agent::RcaAgent,
            LogType::Reasoning,
            "Evidence and knowledge",
            json!({ "evidence": analysis.evidence, "knowledge": suggested }),
        ),
        DiagnosticLogEntry::new(
            Stage::Rca,
            Agent::RcaAgent,
            LogType::Decision,
            "Remediation plan",
            json!({ "plan": analysis.plan, "risk": analysis.risk }),
        ),
    ];

    let event = EventRecord::new(Stage::Rca, Agent::RcaAgent, EventAction::RootCauseIdentified)
        .with_details(json!({
            "root_cause": analysis.root_cause,
            "hypothesis": analysis.hypothesis,
            "confidence": analysis.confidence,
            "affected_devices": affected_devices,
            "remediation_risk": analysis.risk,
        }));

    info!(
        incident = %incident.id,
        root_cause = %analysis.root_cause,
        confidence = analysis.confidence,
        risk = %analysis.risk,
        "rca finished"
    );

    Ok(RcaUpdate {
        analysis,
        affected_devices,
        elapsed: started.elapsed(),
        events: vec![event],
        logs,
    })
}
