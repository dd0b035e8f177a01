//! Shared store of running and completed incidents.
//!
//! The only state shared between concurrent runs. Every read and write goes
//! through one `RwLock`, and the running -> completed swap happens under a
//! single write guard so a status poll never sees an incident vanish.
//! Completed reports are kept up to a retention cap, oldest evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::incident::{FaultType, Incident, IncidentReport, Severity};

/// Completed reports returned by [`IncidentRegistry::summary`].
pub const RECENT_LIMIT: usize = 10;
/// Completed reports kept when no retention is configured.
pub const DEFAULT_RETENTION: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct RunningEntry {
    pub incident_id: String,
    pub device_id: String,
    pub device_name: String,
    pub fault_type: FaultType,
    pub severity: Severity,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedEntry {
    pub completed_at: DateTime<Utc>,
    pub report: IncidentReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Running(RunningEntry),
    Completed(CompletedEntry),
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub running_count: usize,
    pub completed_count: usize,
    pub running: Vec<RunningEntry>,
    /// Latest completions, oldest first.
    pub recent_completed: Vec<CompletedEntry>,
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<String, RunStatus>,
    /// Completed ids in completion order.
    completed: VecDeque<String>,
}

#[derive(Debug, Clone)]
pub struct IncidentRegistry {
    entries: Arc<RwLock<Entries>>,
    retention: usize,
}

impl Default for IncidentRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl IncidentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retention` completed reports (at least one).
    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            retention: retention.max(1),
        }
    }

    pub async fn start(&self, incident: &Incident) {
        let entry = RunningEntry {
            incident_id: incident.id.clone(),
            device_id: incident.device.id.clone(),
            device_name: incident.device.name.clone(),
            fault_type: incident.claimed_fault,
            severity: incident.severity,
            started_at: Utc::now(),
        };
        debug!(incident = %incident.id, "registered running incident");
        self.entries
            .write()
            .await
            .by_id
            .insert(incident.id.clone(), RunStatus::Running(entry));
    }

    pub async fn complete(&self, report: IncidentReport) {
        let id = report.incident_id.clone();
        let entry = CompletedEntry {
            completed_at: Utc::now(),
            report,
        };
        debug!(incident = %id, "registered completed incident");

        let mut entries = self.entries.write().await;
        let previous = entries.by_id.insert(id.clone(), RunStatus::Completed(entry));
        if matches!(previous, Some(RunStatus::Completed(_))) {
            entries.completed.retain(|known| *known != id);
        }
        entries.completed.push_back(id);

        while entries.completed.len() > self.retention {
            if let Some(oldest) = entries.completed.pop_front() {
                entries.by_id.remove(&oldest);
                debug!(incident = %oldest, "evicted completed incident");
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<RunStatus> {
        self.entries.read().await.by_id.get(id).cloned()
    }

    pub async fn summary(&self) -> RegistrySummary {
        let entries = self.entries.read().await;

        let mut running = Vec::new();
        let mut completed = Vec::new();
        for status in entries.by_id.values() {
            match status {
                RunStatus::Running(r) => running.push(r.clone()),
                RunStatus::Completed(c) => completed.push(c.clone()),
            }
        }
        running.sort_by_key(|r| r.started_at);
        completed.sort_by_key(|c| c.completed_at);

        let completed_count = completed.len();
        let recent_completed = completed.split_off(completed_count.saturating_sub(RECENT_LIMIT));

        RegistrySummary {
            running_count: running.len(),
            completed_count,
            running,
            recent_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::DeviceRef;

    fn incident(id: &str) -> Incident {
        let device = DeviceRef {
            id: "device-1".into(),
            name: "core-1".into(),
            device_type: "core".into(),
        };
        Incident::new(id, device, FaultType::CpuSpike, Severity::Low)
    }

    #[tokio::test]
    async fn test_running_then_completed() {
        let registry = IncidentRegistry::new();
        let inc = incident("INC-00000001");

        registry.start(&inc).await;
        assert!(matches!(
            registry.get("INC-00000001").await,
            Some(RunStatus::Running(_))
        ));

        registry.complete(IncidentReport::from(&inc)).await;
        match registry.get("INC-00000001").await {
            Some(RunStatus::Completed(entry)) => {
                assert_eq!(entry.report.incident_id, "INC-00000001")
            }
            other => panic!("expected completed, got {other:?}"),
        }
        assert!(registry.get("INC-MISSING").await.is_none());
    }

    #[tokio::test]
    async fn test_summary_keeps_latest_ten() {
        let registry = IncidentRegistry::new();
        for n in 0..12 {
            registry
                .complete(IncidentReport::from(&incident(&format!("INC-{n:08}"))))
                .await;
        }
        registry.start(&incident("INC-RUNNING")).await;

        let summary = registry.summary().await;
        assert_eq!(summary.running_count, 1);
        assert_eq!(summary.completed_count, 12);
        assert_eq!(summary.recent_completed.len(), RECENT_LIMIT);
    }

    #[tokio::test]
    async fn test_status_serializes_with_tag() {
        let registry = IncidentRegistry::new();
        registry.start(&incident("INC-TAGGED")).await;
        let value = serde_json::to_value(registry.get("INC-TAGGED").await.unwrap()).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["fault_type"], "cpu_spike");
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_completed() {
        let registry = IncidentRegistry::with_retention(3);
        registry.start(&incident("INC-RUNNING")).await;
        for n in 0..5 {
            registry
                .complete(IncidentReport::from(&incident(&format!("INC-{n:08}"))))
                .await;
        }

        assert!(registry.get("INC-00000000").await.is_none());
        assert!(registry.get("INC-00000001").await.is_none());
        for n in 2..5 {
            let id = format!("INC-{n:08}");
            assert!(matches!(registry.get(&id).await, Some(RunStatus::Completed(_))));
        }
        assert!(matches!(
            registry.get("INC-RUNNING").await,
            Some(RunStatus::Running(_))
        ));

        let summary = registry.summary().await;
        assert_eq!(summary.completed_count, 3);
        assert_eq!(summary.running_count, 1);
    }

    #[tokio::test]
    async fn test_recompleting_an_id_does_not_double_count() {
        let registry = IncidentRegistry::with_retention(2);
        let report = IncidentReport::from(&incident("INC-AGAIN"));
        registry.complete(report.clone()).await;
        registry.complete(report).await;
        registry
            .complete(IncidentReport::from(&incident("INC-OTHER")))
            .await;

        assert!(registry.get("INC-AGAIN").await.is_some());
        assert_eq!(registry.summary().await.completed_count, 2);
    }
}
