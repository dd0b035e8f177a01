//! Runs a playbook against the device and topology collaborators.

use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use super::playbook::{interface_in, weight_in, ActionKind, PlaybookAction};
use crate::incident::{ActionFailure, DeviceRef, RemediationActionResult, RiskLevel};
use crate::tools::{DeviceCommandKind, Toolset};

/// Result of one playbook run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub actions: Vec<RemediationActionResult>,
    pub all_succeeded: bool,
    /// A high-risk action failed and the rest of the playbook was dropped.
    pub aborted: bool,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> usize {
        self.actions.iter().filter(|a| a.success).count()
    }
}

struct Dispatched {
    success: bool,
    output: String,
    error: Option<String>,
}

/// Device command for an action. Unstructured kinds send the template as is.
fn device_command(action: &PlaybookAction) -> DeviceCommandKind {
    match action.kind {
        ActionKind::ClearBgpSession => DeviceCommandKind::ClearBgpSession { neighbor: "*".into() },
        ActionKind::AdjustBgpWeight => {
            let (neighbor, weight) = weight_in(&action.command);
            DeviceCommandKind::SetBgpWeight { neighbor, weight }
        }
        ActionKind::ShutdownInterface => DeviceCommandKind::ShutdownInterface {
            name: interface_in(&action.command),
        },
        ActionKind::EnableInterface => DeviceCommandKind::EnableInterface {
            name: interface_in(&action.command),
        },
        _ => DeviceCommandKind::raw(&action.command),
    }
}

pub struct RemediationExecutor<'a> {
    tools: &'a Toolset,
    settle: Duration,
}

impl<'a> RemediationExecutor<'a> {
    pub fn new(tools: &'a Toolset, settle: Duration) -> Self {
        Self { tools, settle }
    }

    /// Execute `playbook` in order.
    ///
    /// High-risk actions are skipped outright when the incident's overall
    /// risk is low. A failed high-risk action stops the run; other failures
    /// are recorded and the run continues.
    pub async fn execute(
        &self,
        device: &DeviceRef,
        overall_risk: RiskLevel,
        playbook: &[PlaybookAction],
    ) -> ExecutionReport {
        let started = Instant::now();
        let mut actions = Vec::with_capacity(playbook.len());
        let mut all_succeeded = true;
        let mut aborted = false;

        for action in playbook {
            if overall_risk == RiskLevel::Low && action.risk == RiskLevel::High {
                info!(action = %action.kind, "skipping high-risk action for low-risk incident");
                continue;
            }

            info!(action = %action.kind, device = %device.name, "executing remediation action");
            let dispatched = match self.dispatch(device, action).await {
                Ok(d) => d,
                Err(e) => Dispatched {
                    success: false,
                    output: String::new(),
                    error: Some(format!("{e:#}")),
                },
            };

            let critical = action.risk == RiskLevel::High;
            let failure = match (dispatched.success, critical) {
                (true, _) => None,
                (false, true) => Some(ActionFailure::Critical),
                (false, false) => Some(ActionFailure::Partial),
            };

            actions.push(RemediationActionResult {
                action_type: action.kind.to_string(),
                command: action.command.clone(),
                target_device: device.name.clone(),
                description: action.description.clone(),
                risk: action.risk,
                executed: true,
                success: dispatched.success,
                output: dispatched.output,
                error: dispatched.error,
                failure,
                rollback_of: None,
                timestamp: Utc::now(),
            });

            if failure.is_some() {
                all_succeeded = false;
                if critical {
                    error!(action = %action.kind, "critical action failed, aborting playbook");
                    aborted = true;
                    break;
                }
                warn!(action = %action.kind, "remediation action failed, continuing");
            }

            if !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }
        }

        ExecutionReport {
            actions,
            all_succeeded,
            aborted,
            elapsed: started.elapsed(),
        }
    }

    async fn dispatch(&self, device: &DeviceRef, action: &PlaybookAction) -> Result<Dispatched> {
        if action.kind == ActionKind::FailoverPath {
            if let Some(node) = self.tools.topology.find_node_by_name(&device.name).await? {
                let outcome = self.tools.topology.reload(&node.node_id).await?;
                let output = outcome
                    .status
                    .map(|s| format!("node {} {}", node.node_id, s))
                    .unwrap_or_default();
                return Ok(Dispatched {
                    success: outcome.success,
                    output,
                    error: outcome.error,
                });
            }
        }

        let command = device_command(action);
        let out = self.tools.device.execute(&device.id, &command).await?;
        Ok(Dispatched {
            success: out.success,
            output: out.output,
            error: out.error,
        })
    }

    /// Revert successful actions that have an inverse, newest first.
    ///
    /// Appends new records; the originals are left as they were.
    pub async fn rollback(
        &self,
        device: &DeviceRef,
        executed: &[RemediationActionResult],
    ) -> Vec<RemediationActionResult> {
        let mut reverted = Vec::new();

        let candidates = executed
            .iter()
            .rev()
            .filter(|a| a.success && a.rollback_of.is_none());
        for original in candidates {
            let inverse = ActionKind::from_name(&original.action_type).and_then(|k| k.inverse());
            let Some(inverse) = inverse else {
                continue;
            };

            let undo = PlaybookAction {
                kind: inverse,
                command: original.command.clone(),
                description: format!("Rollback of {}", original.action_type),
                risk: original.risk,
            };
            let dispatched = match self.dispatch(device, &undo).await {
                Ok(d) => d,
                Err(e) => Dispatched {
                    success: false,
                    output: String::new(),
                    error: Some(format!("{e:#}")),
                },
            };
            info!(
                action = %inverse,
                reverts = %original.action_type,
                success = dispatched.success,
                "rollback action"
            );

            reverted.push(RemediationActionResult {
                action_type: inverse.to_string(),
                command: device_command(&undo).to_cli(),
                target_device: device.name.clone(),
                description: undo.description,
                risk: undo.risk,
                executed: true,
                success: dispatched.success,
                output: dispatched.output,
                error: dispatched.error,
                failure: (!dispatched.success).then_some(ActionFailure::Partial),
                rollback_of: Some(original.action_type.clone()),
                timestamp: Utc::now(),
            });
        }

        reverted
    }
}
