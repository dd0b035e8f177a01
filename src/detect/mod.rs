//! Detection stage: confirm and classify the claimed fault.
//!
//! Collaborator trouble never fails this stage. A failed anomaly scan counts
//! as zero evidence and an unreachable topology as unknown node status.

pub mod scorer;
pub mod signature;

use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};

pub use self::scorer::{Classification, DetectionMethod, EvidenceScorer};

use crate::incident::timeline::{Agent, DiagnosticLogEntry, EventAction, EventRecord, LogType};
use crate::incident::{FaultType, Incident, MetricDeviation, Stage};
use crate::tools::{device_selector, Anomaly, NodeStatus, Toolset};

/// Confidence above which detection reports the fault as confirmed.
const CONFIRMED_THRESHOLD: f64 = 0.5;
const DEVIATION_SIGMA: f64 = 3.0;

const HEALTH_METRICS: [&str; 4] = [
    "cpu_utilization",
    "memory_utilization",
    "bgp_session_state",
    "interface_utilization",
];

/// Partial incident update produced by detection.
#[derive(Debug, Clone)]
pub struct DetectionUpdate {
    pub fault_type: FaultType,
    pub confidence: f64,
    pub method: DetectionMethod,
    pub deviations: Vec<MetricDeviation>,
    pub elapsed: Duration,
    pub events: Vec<EventRecord>,
    pub logs: Vec<DiagnosticLogEntry>,
}

fn deviation(anomaly: &Anomaly) -> MetricDeviation {
    MetricDeviation {
        metric_name: anomaly.metric.clone(),
        baseline: 0.0,
        current: anomaly.value,
        threshold: 0.0,
        deviation_sigma: DEVIATION_SIGMA,
        severity: anomaly.severity,
    }
}

pub async fn run(incident: &Incident, tools: &Toolset) -> DetectionUpdate {
    let started = Instant::now();
    let device = &incident.device;
    info!(
        incident = %incident.id,
        device = %device.name,
        claimed = %incident.claimed_fault,
        "detection started"
    );

    let anomalies = match tools.metrics.scan_anomalies(&device.id).await {
        Ok(found) => found,
        Err(e) => {
            warn!(
                incident = %incident.id,
                error = %e,
                "anomaly scan failed, treating as no evidence"
            );
            Vec::new()
        }
    };

    let mut health = serde_json::Map::new();
    for metric in HEALTH_METRICS {
        let expr = device_selector(metric, &device.id);
        let value = match tools.metrics.query(&device.id, &expr).await {
            Ok(sample) => json!(sample.value),
            Err(e) => json!(format!("error: {e}")),
        };
        health.insert(metric.to_string(), value);
    }

    let lookup = tools.topology.find_node_by_name(&device.name).await;
    let node_status: Option<NodeStatus> = match lookup {
        Ok(node) => node.map(|n| n.status),
        Err(e) => {
            warn!(incident = %incident.id, error = %e, "topology lookup failed");
            None
        }
    };
    let status_text = node_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());

    let classification =
        EvidenceScorer::new().classify(incident.claimed_fault, &anomalies, node_status);
    let deviations: Vec<_> = anomalies.iter().map(deviation).collect();

    let logs = vec![
        DiagnosticLogEntry::new(
            Stage::Detection,
            Agent::DetectionAgent,
            LogType::NetworkData,
            "Device health metrics",
            json!({ "anomalies": anomalies, "health": health, "node_status": status_text }),
        ),
        DiagnosticLogEntry::new(
            Stage::Detection,
            Agent::DetectionAgent,
            LogType::Reasoning,
            "Evidence scores",
            json!(classification
                .scores
                .iter()
                .map(|(ft, score)| (ft.as_str().to_string(), json!(score)))
                .collect::<serde_json::Map<_, _>>()),
        ),
    ];

    let action = if classification.confidence > CONFIRMED_THRESHOLD {
        EventAction::FaultConfirmed
    } else {
        EventAction::FaultAnalysis
    };
    let event = EventRecord::new(Stage::Detection, Agent::DetectionAgent, action)
        .with_details(json!({
            "claimed_fault": incident.claimed_fault,
            "confirmed_fault": classification.fault_type,
            "confidence": classification.confidence,
            "anomalies_found": anomalies.len(),
            "gns3_status": status_text,
            "detection_method": classification.method,
        }));

    info!(
        incident = %incident.id,
        fault = %classification.fault_type,
        confidence = classification.confidence,
        method = %classification.method,
        "detection finished"
    );

    DetectionUpdate {
        fault_type: classification.fault_type,
        confidence: classification.confidence,
        method: classification.method,
        deviations,
        elapsed: started.elapsed(),
        events: vec![event],
        logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{AnomalySeverity, DeviceRef, Severity};
    use crate::tools::simulated::{SimulatedDevice, SimulatedMetrics, SimulatedTopology};
    use std::sync::Arc;

    fn incident(fault: FaultType) -> Incident {
        let device = DeviceRef {
            id: "device-1".into(),
            name: "core-1".into(),
            device_type: "core".into(),
        };
        Incident::new("INC-TEST0001", device, fault, Severity::High)
    }

    fn tools(metrics: SimulatedMetrics) -> Toolset {
        Toolset::new(
            Arc::new(metrics),
            Arc::new(SimulatedDevice::lab()),
            Arc::new(SimulatedTopology::lab()),
        )
    }

    #[tokio::test]
    async fn test_detection_confirms_with_anomaly() {
        let metrics = SimulatedMetrics::new().with_anomalies(vec![Anomaly {
            metric: "bgp_session_state".into(),
            severity: AnomalySeverity::Critical,
            value: 0.0,
            description: String::new(),
        }]);
        let update = run(&incident(FaultType::BgpLinkFlap), &tools(metrics)).await;

        assert_eq!(update.fault_type, FaultType::BgpLinkFlap);
        assert!((update.confidence - 0.85).abs() < 1e-9);
        assert_eq!(update.deviations.len(), 1);
        assert_eq!(update.deviations[0].deviation_sigma, 3.0);
        assert_eq!(update.events[0].action, EventAction::FaultConfirmed);
        assert_eq!(update.events[0].details["gns3_status"], "started");
        assert_eq!(update.events[0].details["anomalies_found"], 1);
    }

    #[tokio::test]
    async fn test_failed_scan_is_zero_evidence() {
        let metrics = SimulatedMetrics::new().with_scan_error("prometheus unreachable");
        let update = run(&incident(FaultType::CpuSpike), &tools(metrics)).await;

        assert!(update.deviations.is_empty());
        assert_eq!(update.method, DetectionMethod::OperatorReported);
        assert_eq!(update.events[0].action, EventAction::FaultAnalysis);
    }
}
