//! Bounded worker pool for background incident runs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info};

use super::registry::IncidentRegistry;
use crate::incident::{Incident, IncidentReport};
use crate::pipeline::{Orchestrator, PipelineError};

#[derive(Clone)]
pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    registry: IncidentRegistry,
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        registry: IncidentRegistry,
        max_workers: usize,
    ) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            orchestrator,
            registry,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &IncidentRegistry {
        &self.registry
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `incident` on the caller's task and return its terminal report.
    pub async fn run_inline(&self, incident: Incident) -> IncidentReport {
        self.registry.start(&incident).await;
        let report = self.execute(incident).await;
        self.registry.complete(report.clone()).await;
        report
    }

    /// Queue `incident` for a background worker and return its id at once.
    pub async fn submit(&self, incident: Incident) -> String {
        let id = incident.id.clone();
        self.registry.start(&incident).await;
        info!(incident = %id, "incident queued for background run");

        let pool = self.clone();
        tokio::spawn(async move {
            let _permit = match pool.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let report = lost(incident, e.to_string());
                    pool.registry.complete(report).await;
                    return;
                }
            };
            let report = pool.execute(incident).await;
            pool.registry.complete(report).await;
        });

        id
    }

    /// Run on a separate task so a cancelled or aborted worker becomes a
    /// `failed_error` report instead of leaving the incident stuck as running.
    async fn execute(&self, incident: Incident) -> IncidentReport {
        let snapshot = incident.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        match tokio::spawn(async move { orchestrator.run(incident).await }).await {
            Ok(done) => IncidentReport::from(done),
            Err(e) => {
                error!(incident = %snapshot.id, error = %e, "incident worker lost");
                lost(snapshot, e.to_string())
            }
        }
    }
}

fn lost(mut incident: Incident, reason: String) -> IncidentReport {
    Orchestrator::fail(&mut incident, &PipelineError::WorkerLost(reason));
    IncidentReport::from(incident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::incident::{DeviceRef, FaultType, Severity, Stage};
    use crate::scheduler::registry::RunStatus;
    use crate::tools::simulated::{SimulatedDevice, SimulatedTopology};
    use crate::tools::{Anomaly, MetricSample, MetricsQuery, Toolset};
    use std::time::Duration;

    struct PanickingMetrics;

    #[async_trait::async_trait]
    impl MetricsQuery for PanickingMetrics {
        async fn query(&self, _device_id: &str, _expr: &str) -> anyhow::Result<MetricSample> {
            Ok(MetricSample::no_data())
        }

        async fn scan_anomalies(&self, _device_id: &str) -> anyhow::Result<Vec<Anomaly>> {
            panic!("metrics backend exploded");
        }
    }

    fn incident(id: &str) -> Incident {
        let device = DeviceRef {
            id: "device-1".into(),
            name: "core-1".into(),
            device_type: "core".into(),
        };
        Incident::new(id, device, FaultType::BgpLinkFlap, Severity::High)
    }

    fn pool(tools: Toolset) -> WorkerPool {
        let orchestrator = Arc::new(Orchestrator::new(tools, PipelineConfig::immediate()));
        WorkerPool::new(orchestrator, IncidentRegistry::new(), 2)
    }

    async fn wait_completed(pool: &WorkerPool, id: &str) -> IncidentReport {
        for _ in 0..200 {
            if let Some(RunStatus::Completed(entry)) = pool.registry().get(id).await {
                return entry.report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("incident {id} never completed");
    }

    #[tokio::test]
    async fn test_inline_run_registers_completion() {
        let pool = pool(Toolset::simulated());
        let report = pool.run_inline(incident("INC-INLINE1")).await;
        assert_eq!(report.stage, Stage::Resolved);
        assert!(matches!(
            pool.registry().get("INC-INLINE1").await,
            Some(RunStatus::Completed(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_completes_in_background() {
        let pool = pool(Toolset::simulated());
        let id = pool.submit(incident("INC-ASYNC01")).await;
        assert_eq!(id, "INC-ASYNC01");
        let report = wait_completed(&pool, &id).await;
        assert_eq!(report.stage, Stage::Resolved);
    }

    #[tokio::test]
    async fn test_panicking_run_becomes_failed_error() {
        let tools = Toolset::new(
            Arc::new(PanickingMetrics),
            Arc::new(SimulatedDevice::lab()),
            Arc::new(SimulatedTopology::lab()),
        );
        let pool = pool(tools);
        let id = pool.submit(incident("INC-PANIC01")).await;
        let report = wait_completed(&pool, &id).await;
        assert_eq!(report.stage, Stage::FailedError);
        assert_eq!(
            report.error.as_deref(),
            Some("detection stage panicked: metrics backend exploded")
        );
    }

    #[test]
    fn test_zero_workers_clamped() {
        let orchestrator = Arc::new(Orchestrator::new(
            Toolset::simulated(),
            PipelineConfig::immediate(),
        ));
        let pool = WorkerPool::new(orchestrator, IncidentRegistry::new(), 0);
        assert_eq!(pool.max_workers(), 1);
    }
}
