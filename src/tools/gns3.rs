//! Live topology control through the GNS3 v2 REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde::Deserialize;
use tracing::warn;

use super::{NodeStatus, ToolHealth, TopologyControl, TopologyNode, TopologyOutcome};
use crate::config::ToolsConfig;

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: Option<NodeStatus>,
}

#[derive(Debug, Deserialize)]
struct VersionBody {
    version: String,
}

pub struct Gns3Client {
    client: Client,
    base_url: String,
    project_id: String,
    auth: Option<(String, String)>,
}

impl Gns3Client {
    pub fn new(config: &ToolsConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build GNS3 HTTP client")?;
        let auth = match (&config.gns3_username, &config.gns3_password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Ok(Self {
            client,
            base_url: config.gns3_url.trim_end_matches('/').to_string(),
            project_id: config.gns3_project_id.clone(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/projects/{}{}", self.base_url, self.project_id, path)
    }

    async fn send(&self, method: Method, path: &str) -> Result<reqwest::Response, String> {
        self.request(method, self.url(path)).await
    }

    async fn request(&self, method: Method, url: String) -> Result<reqwest::Response, String> {
        let mut request = self.client.request(method, url);
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }
        request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())
    }

    async fn control(&self, node_id: &str, op: &str) -> Result<TopologyOutcome> {
        let response = match self.send(Method::POST, &format!("/nodes/{node_id}/{op}")).await {
            Ok(r) => r,
            Err(e) => {
                warn!(%node_id, %op, error = %e, "gns3 node control failed");
                return Ok(TopologyOutcome::failed(e));
            }
        };
        let body: StatusBody = response.json().await.unwrap_or(StatusBody { status: None });
        Ok(TopologyOutcome {
            success: true,
            status: body.status,
            error: None,
        })
    }
}

#[async_trait::async_trait]
impl TopologyControl for Gns3Client {
    async fn find_node_by_name(&self, name: &str) -> Result<Option<TopologyNode>> {
        let nodes: Vec<TopologyNode> = match self.send(Method::GET, "/nodes").await {
            Ok(r) => r.json().await.context("Malformed GNS3 node list")?,
            Err(e) => {
                warn!(error = %e, "gns3 node listing failed");
                return Ok(None);
            }
        };
        Ok(nodes.into_iter().find(|n| n.name.eq_ignore_ascii_case(name)))
    }

    async fn start(&self, node_id: &str) -> Result<TopologyOutcome> {
        self.control(node_id, "start").await
    }

    async fn stop(&self, node_id: &str) -> Result<TopologyOutcome> {
        self.control(node_id, "stop").await
    }

    async fn reload(&self, node_id: &str) -> Result<TopologyOutcome> {
        self.control(node_id, "reload").await
    }

    async fn health(&self) -> ToolHealth {
        let url = format!("{}/v2/version", self.base_url);
        let response = match self.request(Method::GET, url).await {
            Ok(r) => r,
            Err(e) => return ToolHealth::disconnected(e),
        };
        match response.json::<VersionBody>().await {
            Ok(body) => ToolHealth::connected(format!("Version: {}", body.version)),
            Err(e) => ToolHealth::disconnected(format!("Malformed GNS3 version reply: {e}")),
        }
    }
}
