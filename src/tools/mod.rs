//! Collaborator contracts consumed by the healing pipeline.
//!
//! The pipeline only talks to devices, metrics, and topology through the
//! three traits here. Each has a simulated implementation (lab fixture,
//! scriptable for tests) and a live one. An `Err` from any method means an
//! unexpected failure; ordinary collaborator failures come back as `Ok`
//! values with `success == false`.

pub mod gns3;
pub mod health;
pub mod prometheus;
pub mod simulated;
pub mod sonic;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use self::health::{Connectivity, ToolHealth};

use crate::config::ToolsConfig;
use crate::incident::AnomalySeverity;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// One anomaly reported by a metrics scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric: String,
    pub severity: AnomalySeverity,
    pub value: f64,
    #[serde(default)]
    pub description: String,
}

/// Point-in-time value of a metric query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub success: bool,
    pub value: Option<String>,
    pub error: Option<String>,
}

impl MetricSample {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            error: None,
        }
    }

    pub fn no_data() -> Self {
        Self {
            success: true,
            value: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait MetricsQuery: Send + Sync {
    /// Instant query of `expr` scoped to `device_id`.
    async fn query(&self, device_id: &str, expr: &str) -> Result<MetricSample>;

    /// Scan the device's key metrics for threshold breaches.
    async fn scan_anomalies(&self, device_id: &str) -> Result<Vec<Anomaly>>;

    async fn health(&self) -> ToolHealth {
        ToolHealth::simulated()
    }
}

/// Build the PromQL selector for a metric on one device.
pub fn device_selector(metric: &str, device_id: &str) -> String {
    format!("{metric}{{device=\"{device_id}\"}}")
}

// ---------------------------------------------------------------------------
// Device commands
// ---------------------------------------------------------------------------

/// Structured command understood by the device collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceCommandKind {
    ClearBgpSession { neighbor: String },
    SetBgpWeight { neighbor: String, weight: u32 },
    ShutdownInterface { name: String },
    EnableInterface { name: String },
    Raw { command: String },
}

impl DeviceCommandKind {
    pub fn raw(command: impl Into<String>) -> Self {
        DeviceCommandKind::Raw {
            command: command.into(),
        }
    }

    /// The vtysh text the device receives for this command.
    pub fn to_cli(&self) -> String {
        match self {
            DeviceCommandKind::ClearBgpSession { neighbor } => format!("clear bgp * {neighbor}"),
            DeviceCommandKind::SetBgpWeight { neighbor, weight } => {
                format!("configure terminal\nrouter bgp\nneighbor {neighbor} weight {weight}")
            }
            DeviceCommandKind::ShutdownInterface { name } => {
                format!("configure terminal\ninterface {name}\nshutdown")
            }
            DeviceCommandKind::EnableInterface { name } => {
                format!("configure terminal\ninterface {name}\nno shutdown")
            }
            DeviceCommandKind::Raw { command } => command.clone(),
        }
    }
}

impl fmt::Display for DeviceCommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cli())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait DeviceCommand: Send + Sync {
    async fn execute(&self, device_id: &str, command: &DeviceCommandKind) -> Result<CommandOutput>;

    async fn health(&self) -> ToolHealth {
        ToolHealth::simulated()
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Lifecycle state of a topology node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Started,
    #[serde(alias = "offline")]
    Stopped,
    Suspended,
    #[serde(other)]
    Unknown,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Started => "started",
            NodeStatus::Stopped => "stopped",
            NodeStatus::Suspended => "suspended",
            NodeStatus::Unknown => "unknown",
        }
    }

    /// The node is down in a way that severs links and sessions.
    pub fn is_offline(&self) -> bool {
        *self == NodeStatus::Stopped
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub node_id: String,
    pub name: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyOutcome {
    pub success: bool,
    pub status: Option<NodeStatus>,
    pub error: Option<String>,
}

impl TopologyOutcome {
    pub fn ok(status: NodeStatus) -> Self {
        Self {
            success: true,
            status: Some(status),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait TopologyControl: Send + Sync {
    async fn find_node_by_name(&self, name: &str) -> Result<Option<TopologyNode>>;
    async fn start(&self, node_id: &str) -> Result<TopologyOutcome>;
    async fn stop(&self, node_id: &str) -> Result<TopologyOutcome>;
    async fn reload(&self, node_id: &str) -> Result<TopologyOutcome>;

    async fn health(&self) -> ToolHealth {
        ToolHealth::simulated()
    }
}

// ---------------------------------------------------------------------------
// Toolset
// ---------------------------------------------------------------------------

/// The three collaborators a pipeline run needs, shareable across runs.
#[derive(Clone)]
pub struct Toolset {
    pub metrics: Arc<dyn MetricsQuery>,
    pub device: Arc<dyn DeviceCommand>,
    pub topology: Arc<dyn TopologyControl>,
}

impl Toolset {
    pub fn new(
        metrics: Arc<dyn MetricsQuery>,
        device: Arc<dyn DeviceCommand>,
        topology: Arc<dyn TopologyControl>,
    ) -> Self {
        Self {
            metrics,
            device,
            topology,
        }
    }

    /// Deterministic lab fixture for every collaborator.
    pub fn simulated() -> Self {
        Self::new(
            Arc::new(simulated::SimulatedMetrics::lab()),
            Arc::new(simulated::SimulatedDevice::lab()),
            Arc::new(simulated::SimulatedTopology::lab()),
        )
    }

    /// Pick live or simulated adapters per collaborator from config.
    pub fn from_config(config: &ToolsConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_sec);

        let metrics: Arc<dyn MetricsQuery> = if config.prometheus_enabled {
            info!(url = %config.prometheus_url, "using live Prometheus metrics");
            Arc::new(prometheus::PrometheusClient::new(&config.prometheus_url, timeout)?)
        } else {
            Arc::new(simulated::SimulatedMetrics::lab())
        };

        let topology: Arc<dyn TopologyControl> = if config.gns3_enabled {
            info!(
                url = %config.gns3_url,
                project = %config.gns3_project_id,
                "using live GNS3 topology"
            );
            Arc::new(gns3::Gns3Client::new(config, timeout)?)
        } else {
            Arc::new(simulated::SimulatedTopology::lab())
        };

        let device: Arc<dyn DeviceCommand> = if config.sonic_enabled {
            info!(device_ip = ?config.sonic_device_ip, "using live SONiC vtysh");
            Arc::new(sonic::SonicCli::new(config.sonic_device_ip.clone()))
        } else {
            Arc::new(simulated::SimulatedDevice::lab())
        };

        Ok(Self::new(metrics, device, topology))
    }

    /// Human-readable source per collaborator: `live` or `simulated`.
    pub fn describe(config: &ToolsConfig) -> serde_json::Value {
        let mode = |live: bool| if live { "live" } else { "simulated" };
        serde_json::json!({
            "prometheus": mode(config.prometheus_enabled),
            "gns3": mode(config.gns3_enabled),
            "sonic": mode(config.sonic_enabled),
        })
    }
}
