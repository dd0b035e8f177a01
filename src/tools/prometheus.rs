//! Live metrics source backed by the Prometheus HTTP API.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{device_selector, Anomaly, MetricSample, MetricsQuery, ToolHealth};
use crate::incident::AnomalySeverity;

const ERROR_RATE_CRITICAL: f64 = 100.0;
const ERROR_RATE_WARNING: f64 = 50.0;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<Series>,
}

#[derive(Debug, Clone, Deserialize)]
struct Series {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[unix_ts, "value"]`
    value: (f64, String),
}

impl Series {
    fn label(&self, key: &str) -> &str {
        self.metric.get(key).map(String::as_str).unwrap_or("unknown")
    }

    fn number(&self) -> Option<f64> {
        self.value.1.parse().ok()
    }
}

pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Prometheus HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Instant vector query. Transport and API failures come back as `Err`
    /// carrying the reason so callers can fold them into a failed sample.
    async fn instant(&self, expr: &str) -> Result<Vec<Series>, String> {
        let url = format!("{}/api/v1/query", self.base_url);
        debug!(%expr, "prometheus query");

        let response = self
            .client
            .get(&url)
            .query(&[("query", expr)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        let body: QueryResponse = response.json().await.map_err(|e| e.to_string())?;
        if body.status != "success" {
            return Err(body.error.unwrap_or_else(|| format!("status {}", body.status)));
        }
        Ok(body.data.map(|d| d.result).unwrap_or_default())
    }
}

fn bgp_anomalies(series: &[Series]) -> Vec<Anomaly> {
    series
        .iter()
        .filter(|s| s.number() == Some(0.0))
        .map(|s| Anomaly {
            metric: "bgp_session_state".into(),
            severity: AnomalySeverity::Critical,
            value: 0.0,
            description: format!("BGP session down for neighbor {}", s.label("neighbor")),
        })
        .collect()
}

fn error_rate_anomalies(series: &[Series]) -> Vec<Anomaly> {
    series
        .iter()
        .filter_map(|s| {
            let value = s.number()?;
            let interface = s.label("interface");
            let (severity, description) = if value >= ERROR_RATE_CRITICAL {
                (AnomalySeverity::Critical, format!("High error rate on interface {interface}"))
            } else if value >= ERROR_RATE_WARNING {
                (AnomalySeverity::Warning, format!("Elevated error rate on interface {interface}"))
            } else {
                return None;
            };
            Some(Anomaly {
                metric: "interface_errors_rate".into(),
                severity,
                value,
                description,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl MetricsQuery for PrometheusClient {
    async fn query(&self, _device_id: &str, expr: &str) -> Result<MetricSample> {
        match self.instant(expr).await {
            Ok(series) => Ok(series
                .first()
                .map(|s| MetricSample::value(s.value.1.clone()))
                .unwrap_or_else(MetricSample::no_data)),
            Err(e) => {
                warn!(%expr, error = %e, "prometheus query failed");
                Ok(MetricSample::failed(e))
            }
        }
    }

    async fn scan_anomalies(&self, device_id: &str) -> Result<Vec<Anomaly>> {
        let mut anomalies = Vec::new();

        match self.instant(&device_selector("bgp_session_state", device_id)).await {
            Ok(series) => anomalies.extend(bgp_anomalies(&series)),
            Err(e) => warn!(error = %e, "bgp session scan failed"),
        }

        let rate = format!("rate({}[5m])", device_selector("interface_errors_total", device_id));
        match self.instant(&rate).await {
            Ok(series) => anomalies.extend(error_rate_anomalies(&series)),
            Err(e) => warn!(error = %e, "interface error scan failed"),
        }

        Ok(anomalies)
    }

    async fn health(&self) -> ToolHealth {
        match self.instant("up").await {
            Ok(_) => ToolHealth::connected("Metrics collection active"),
            Err(e) => ToolHealth::disconnected(e),
        }
    }
}
