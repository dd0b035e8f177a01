//! Connectivity report across the three collaborators.
//!
//! Each adapter answers [`ToolHealth`] for itself: live adapters make one
//! cheap round trip, simulated ones always report `simulated`. A failed
//! round trip is reported as `disconnected`, never as an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::Toolset;
use crate::config::ToolsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Connected,
    Simulated,
    Disconnected,
}

/// What one collaborator said about itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolHealth {
    pub status: Connectivity,
    pub message: String,
}

impl ToolHealth {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            status: Connectivity::Connected,
            message: message.into(),
        }
    }

    pub fn simulated() -> Self {
        Self {
            status: Connectivity::Simulated,
            message: "Running in simulation mode".into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            status: Connectivity::Disconnected,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub status: Connectivity,
    pub message: String,
    pub url: Option<String>,
    pub enabled: bool,
    pub capabilities: &'static [&'static str],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub connected: usize,
    pub simulated: usize,
    pub disconnected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsHealthReport {
    pub tools: Vec<ToolEntry>,
    pub summary: HealthSummary,
    pub timestamp: DateTime<Utc>,
}

/// Ask every collaborator for its health concurrently.
pub async fn check(tools: &Toolset, config: &ToolsConfig) -> ToolsHealthReport {
    let (topology, metrics, device) = tokio::join!(
        tools.topology.health(),
        tools.metrics.health(),
        tools.device.health(),
    );

    let entries = vec![
        ToolEntry {
            id: "gns3",
            name: "GNS3 Network Simulator",
            description: "Network topology simulation and node control",
            status: topology.status,
            message: topology.message,
            url: Some(config.gns3_url.clone()),
            enabled: config.gns3_enabled,
            capabilities: &[
                "Node lifecycle management",
                "Link control",
                "Topology visualization",
            ],
        },
        ToolEntry {
            id: "prometheus",
            name: "Prometheus Metrics",
            description: "Time-series metrics collection and queries",
            status: metrics.status,
            message: metrics.message,
            url: Some(config.prometheus_url.clone()),
            enabled: config.prometheus_enabled,
            capabilities: &[
                "Real-time metric queries",
                "Threshold monitoring",
                "Anomaly detection data",
            ],
        },
        ToolEntry {
            id: "sonic",
            name: "SONiC Network OS",
            description: "Network operating system for remediation actions",
            status: device.status,
            message: device.message,
            url: config.sonic_device_ip.clone(),
            enabled: config.sonic_enabled,
            capabilities: &[
                "BGP session management",
                "Interface control",
                "Configuration changes",
            ],
        },
    ];

    let summary = summarize(&entries);
    debug!(?summary, "tool health checked");
    ToolsHealthReport {
        tools: entries,
        summary,
        timestamp: Utc::now(),
    }
}

fn summarize(entries: &[ToolEntry]) -> HealthSummary {
    let mut summary = HealthSummary {
        total: entries.len(),
        ..HealthSummary::default()
    };
    for entry in entries {
        match entry.status {
            Connectivity::Connected => summary.connected += 1,
            Connectivity::Simulated => summary.simulated += 1,
            Connectivity::Disconnected => summary.disconnected += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::tools::prometheus::PrometheusClient;
    use crate::tools::simulated::{SimulatedDevice, SimulatedTopology};

    #[tokio::test]
    async fn test_lab_tools_report_simulated() {
        let report = check(&Toolset::simulated(), &ToolsConfig::default()).await;

        assert_eq!(
            report.summary,
            HealthSummary {
                total: 3,
                connected: 0,
                simulated: 3,
                disconnected: 0,
            }
        );
        let ids: Vec<_> = report.tools.iter().map(|t| t.id).collect();
        assert_eq!(ids, ["gns3", "prometheus", "sonic"]);
        assert!(report.tools.iter().all(|t| !t.enabled));
        assert_eq!(report.tools[1].message, "Running in simulation mode");
    }

    #[tokio::test]
    async fn test_unreachable_prometheus_is_disconnected() {
        let metrics = PrometheusClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let tools = Toolset::new(
            Arc::new(metrics),
            Arc::new(SimulatedDevice::lab()),
            Arc::new(SimulatedTopology::lab()),
        );
        let config = ToolsConfig {
            prometheus_enabled: true,
            prometheus_url: "http://127.0.0.1:1".into(),
            ..ToolsConfig::default()
        };

        let report = check(&tools, &config).await;

        let prometheus = &report.tools[1];
        assert_eq!(prometheus.status, Connectivity::Disconnected);
        assert!(prometheus.enabled);
        assert!(!prometheus.message.is_empty());
        assert_eq!(report.summary.disconnected, 1);
        assert_eq!(report.summary.simulated, 2);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let value = serde_json::to_value(ToolHealth::connected("Version: 2.2.43")).unwrap();
        assert_eq!(value["status"], "connected");
        assert_eq!(value["message"], "Version: 2.2.43");
    }
}
