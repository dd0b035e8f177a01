//! Deterministic in-memory collaborators.
//!
//! `lab()` reproduces a small SONiC fabric (core-1, spine-1, spine-2, tor-1)
//! with one BGP neighbor stuck in Active and Ethernet8 oper-down. The
//! builder methods let tests script values, sequences across calls,
//! collaborator failures, and hard errors. Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::{
    Anomaly, CommandOutput, DeviceCommand, DeviceCommandKind, MetricSample, MetricsQuery,
    NodeStatus, TopologyControl, TopologyNode, TopologyOutcome,
};
use crate::incident::AnomalySeverity;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Script state is plain data, so a poisoned lock is still usable.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Metric name of a `name{labels}` selector.
fn metric_name(expr: &str) -> &str {
    expr.split('{').next().unwrap_or(expr).trim()
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Sample(MetricSample),
    Error(String),
}

#[derive(Debug, Default)]
struct MetricsScript {
    lab: bool,
    series: HashMap<String, VecDeque<Scripted>>,
    anomalies: Option<Vec<Anomaly>>,
    scan_error: Option<String>,
    queries: Vec<String>,
}

/// Scriptable metrics source. Unscripted queries return no data unless the
/// lab fixture is enabled.
#[derive(Debug, Default)]
pub struct SimulatedMetrics {
    inner: Mutex<MetricsScript>,
}

impl SimulatedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lab() -> Self {
        let metrics = Self::new();
        lock(&metrics.inner).lab = true;
        metrics
    }

    fn push(self, metric: &str, entry: Scripted) -> Self {
        lock(&self.inner)
            .series
            .entry(metric.to_string())
            .or_default()
            .push_back(entry);
        self
    }

    /// Always answer `metric` with `value`.
    pub fn with_value(self, metric: &str, value: impl Into<String>) -> Self {
        self.push(metric, Scripted::Sample(MetricSample::value(value)))
    }

    /// Answer successive queries with successive values; the last one sticks.
    pub fn with_sequence<I, S>(self, metric: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        values
            .into_iter()
            .fold(self, |m, v| m.push(metric, Scripted::Sample(MetricSample::value(v))))
    }

    pub fn with_sample(self, metric: &str, sample: MetricSample) -> Self {
        self.push(metric, Scripted::Sample(sample))
    }

    /// Make queries for `metric` return `Err`.
    pub fn with_query_error(self, metric: &str, message: impl Into<String>) -> Self {
        self.push(metric, Scripted::Error(message.into()))
    }

    pub fn with_anomalies(self, anomalies: Vec<Anomaly>) -> Self {
        lock(&self.inner).anomalies = Some(anomalies);
        self
    }

    /// Make `scan_anomalies` return `Err`.
    pub fn with_scan_error(self, message: impl Into<String>) -> Self {
        lock(&self.inner).scan_error = Some(message.into());
        self
    }

    /// Every expression queried so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.inner).queries.clone()
    }

    fn lab_sample(expr: &str) -> MetricSample {
        let q = expr.to_ascii_lowercase();
        if q.contains("bgp_session") {
            MetricSample::value("1")
        } else if q.contains("interface_errors") {
            MetricSample::value("156")
        } else if q.contains("cpu") {
            MetricSample::value("45")
        } else if q.contains("memory") {
            MetricSample::value("58")
        } else if q.contains("traffic") || q.contains("utilization") {
            MetricSample::value("78")
        } else {
            MetricSample::no_data()
        }
    }

    fn lab_anomalies() -> Vec<Anomaly> {
        vec![
            Anomaly {
                metric: "bgp_session_state".into(),
                severity: AnomalySeverity::Critical,
                value: 0.0,
                description: "BGP session down for neighbor 10.0.0.4".into(),
            },
            Anomaly {
                metric: "interface_errors_rate".into(),
                severity: AnomalySeverity::Critical,
                value: 156.0,
                description: "High error rate on interface Ethernet8".into(),
            },
        ]
    }
}

#[async_trait::async_trait]
impl MetricsQuery for SimulatedMetrics {
    async fn query(&self, _device_id: &str, expr: &str) -> Result<MetricSample> {
        let mut script = lock(&self.inner);
        script.queries.push(expr.to_string());

        let lab = script.lab;
        let scripted = script.series.get_mut(metric_name(expr)).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });

        match scripted {
            Some(Scripted::Sample(sample)) => Ok(sample),
            Some(Scripted::Error(message)) => Err(anyhow!(message)),
            None if lab => Ok(Self::lab_sample(expr)),
            None => Ok(MetricSample::no_data()),
        }
    }

    async fn scan_anomalies(&self, _device_id: &str) -> Result<Vec<Anomaly>> {
        let script = lock(&self.inner);
        if let Some(message) = &script.scan_error {
            return Err(anyhow!(message.clone()));
        }
        Ok(match &script.anomalies {
            Some(anomalies) => anomalies.clone(),
            None if script.lab => Self::lab_anomalies(),
            None => Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Error(String),
}

#[derive(Debug, Default)]
struct DeviceScript {
    lab: bool,
    replies: Vec<(String, Reply)>,
    executed: Vec<DeviceCommandKind>,
}

/// Scriptable device CLI. Patterns match case-insensitively against the
/// rendered command text; the first matching pattern wins.
#[derive(Debug, Default)]
pub struct SimulatedDevice {
    inner: Mutex<DeviceScript>,
}

const LAB_BGP_SUMMARY: &str = "\
BGP router identifier 10.0.0.1, local AS number 65001
Neighbor        V    AS MsgRcvd MsgSent TblVer  InQ OutQ  Up/Down State/PfxRcd
10.0.0.2        4 65002    1452    1389      0    0    0 01:23:45       12
10.0.0.3        4 65003    1128    1089      0    0    0 00:45:12        8
10.0.0.4        4 65004       0       0      0    0    0    never   Active
";

const LAB_INTERFACE_STATUS: &str = "\
Interface      Lanes  Speed  MTU  Alias  Admin  Oper
Ethernet0      0,1    100G   9100  Eth1/1   up    up
Ethernet4      4,5    100G   9100  Eth1/2   up    up
Ethernet8      8,9    100G   9100  Eth1/3   up   down
Ethernet12    12,13   100G   9100  Eth1/4   up    up
";

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lab() -> Self {
        let device = Self::new();
        lock(&device.inner).lab = true;
        device
    }

    fn reply(self, pattern: &str, reply: Reply) -> Self {
        lock(&self.inner)
            .replies
            .push((pattern.to_ascii_lowercase(), reply));
        self
    }

    pub fn with_output(self, pattern: &str, output: impl Into<String>) -> Self {
        self.reply(pattern, Reply::Output(CommandOutput::ok(output)))
    }

    /// Commands matching `pattern` complete with `success == false`.
    pub fn with_failure(self, pattern: &str, error: impl Into<String>) -> Self {
        self.reply(pattern, Reply::Output(CommandOutput::failed(error)))
    }

    /// Commands matching `pattern` return `Err`.
    pub fn with_error(self, pattern: &str, message: impl Into<String>) -> Self {
        self.reply(pattern, Reply::Error(message.into()))
    }

    pub fn executed(&self) -> Vec<DeviceCommandKind> {
        lock(&self.inner).executed.clone()
    }

    fn lab_output(cli: &str) -> CommandOutput {
        let c = cli.to_ascii_lowercase();
        if c.contains("show bgp summary") {
            CommandOutput::ok(LAB_BGP_SUMMARY)
        } else if c.contains("show interface status") {
            CommandOutput::ok(LAB_INTERFACE_STATUS)
        } else if c.contains("neighbor") && c.contains("weight") {
            CommandOutput::ok("BGP neighbor weight updated successfully")
        } else if c.contains("no shutdown") {
            CommandOutput::ok("Interface enabled")
        } else if c.contains("shutdown") {
            CommandOutput::ok("Interface shutdown complete")
        } else if c.contains("clear bgp") {
            CommandOutput::ok("BGP session cleared successfully")
        } else {
            CommandOutput::ok(format!("Command executed: {cli}"))
        }
    }
}

#[async_trait::async_trait]
impl DeviceCommand for SimulatedDevice {
    async fn execute(
        &self,
        _device_id: &str,
        command: &DeviceCommandKind,
    ) -> Result<CommandOutput> {
        let mut script = lock(&self.inner);
        script.executed.push(command.clone());

        let cli = command.to_cli();
        let lowered = cli.to_ascii_lowercase();
        let scripted = script
            .replies
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        match scripted {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Error(message)) => Err(anyhow!(message)),
            None if script.lab => Ok(Self::lab_output(&cli)),
            None => Ok(CommandOutput::ok(format!("Command executed: {cli}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TopologyScript {
    nodes: Vec<TopologyNode>,
    lookup_error: Option<String>,
    failing: Vec<String>,
    calls: Vec<(String, String)>,
}

/// In-memory node inventory. Control calls update node status.
#[derive(Debug, Default)]
pub struct SimulatedTopology {
    inner: Mutex<TopologyScript>,
}

impl SimulatedTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lab() -> Self {
        [
            ("core-1", NodeStatus::Started),
            ("spine-1", NodeStatus::Started),
            ("spine-2", NodeStatus::Stopped),
            ("tor-1", NodeStatus::Started),
        ]
        .into_iter()
        .fold(Self::new(), |t, (name, status)| t.with_node(name, status))
    }

    pub fn with_node(self, name: &str, status: NodeStatus) -> Self {
        {
            let mut script = lock(&self.inner);
            let node_id = format!("node-{}", script.nodes.len() + 1);
            script.nodes.push(TopologyNode {
                node_id,
                name: name.to_string(),
                status,
                node_type: "dynamips".into(),
            });
        }
        self
    }

    /// Make `find_node_by_name` return `Err`.
    pub fn with_lookup_error(self, message: impl Into<String>) -> Self {
        lock(&self.inner).lookup_error = Some(message.into());
        self
    }

    /// Control calls against `node_id` complete with `success == false`.
    pub fn with_failing_node(self, node_id: &str) -> Self {
        lock(&self.inner).failing.push(node_id.to_string());
        self
    }

    /// `(operation, node_id)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.inner).calls.clone()
    }

    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        lock(&self.inner)
            .nodes
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
            .map(|n| n.status)
    }

    fn control(&self, op: &str, node_id: &str, status: NodeStatus) -> TopologyOutcome {
        let mut script = lock(&self.inner);
        script.calls.push((op.to_string(), node_id.to_string()));

        if script.failing.iter().any(|id| id == node_id) {
            return TopologyOutcome::failed(format!("{op} failed for {node_id}"));
        }
        if let Some(node) = script.nodes.iter_mut().find(|n| n.node_id == node_id) {
            node.status = status;
        }
        TopologyOutcome::ok(status)
    }
}

#[async_trait::async_trait]
impl TopologyControl for SimulatedTopology {
    async fn find_node_by_name(&self, name: &str) -> Result<Option<TopologyNode>> {
        let script = lock(&self.inner);
        if let Some(message) = &script.lookup_error {
            return Err(anyhow!(message.clone()));
        }
        Ok(script
            .nodes
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn start(&self, node_id: &str) -> Result<TopologyOutcome> {
        Ok(self.control("start", node_id, NodeStatus::Started))
    }

    async fn stop(&self, node_id: &str) -> Result<TopologyOutcome> {
        Ok(self.control("stop", node_id, NodeStatus::Stopped))
    }

    async fn reload(&self, node_id: &str) -> Result<TopologyOutcome> {
        Ok(self.control("reload", node_id, NodeStatus::Started))
    }
}
