//! Optional narrative enrichment for detection and RCA.
//!
//! An enricher only ever returns display text. The orchestrator appends it
//! to the timeline or swaps it in as the hypothesis wording; fault type,
//! confidence, risk and plan never read from it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EnrichmentConfig;
use crate::incident::Incident;

pub const CLASSIFICATION_LIMIT: usize = 500;
pub const HYPOTHESIS_LIMIT: usize = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CLASSIFY_SYSTEM_PROMPT: &str = "\
    You are a network fault detection specialist for enterprise SONiC networks.\n\
    Analyze the provided metrics and anomalies to confirm the fault type \
    and provide confidence score.\n\
    \n\
    Fault types you can identify:\n\
    - bgp_link_flap: Rapid BGP session state changes, often due to physical link issues\n\
    - bgp_session_instability: BGP session down without physical link problems\n\
    - traffic_drop: Unexpected traffic decrease, routing or forwarding issues\n\
    - cpu_spike: High CPU utilization affecting performance\n\
    - memory_exhaustion: High memory usage approaching critical levels\n\
    \n\
    Respond with:\n\
    1. Confirmed fault type\n\
    2. Confidence (0.0 to 1.0)\n\
    3. Brief reasoning";

const ANALYZE_SYSTEM_PROMPT: &str = "\
    You are a senior network engineer specializing in SONiC-based data center fabrics.\n\
    Perform root cause analysis on the provided incident data.\n\
    \n\
    Your analysis should:\n\
    1. Identify the most likely root cause\n\
    2. Explain your reasoning with evidence\n\
    3. Suggest specific remediation actions\n\
    4. Assess the risk of each action\n\
    \n\
    Be precise and technical. Focus on actionable insights.";

/// Source of free-text narrative for an incident.
#[async_trait::async_trait]
pub trait HypothesisEnricher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Narrative on the detection result. `None` means nothing to add.
    async fn classify(&self, incident: &Incident) -> Result<Option<String>>;

    /// Narrative replacing the RCA hypothesis text.
    async fn analyze(&self, incident: &Incident) -> Result<Option<String>>;
}

/// Pick the enricher once at startup.
///
/// The AI variant is used only when enabled and its key variable is set;
/// anything else falls back to the rule-based one.
pub fn from_config(config: &EnrichmentConfig) -> Arc<dyn HypothesisEnricher> {
    if !config.enabled {
        return Arc::new(RuleBasedEnricher);
    }
    let api_key = match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            info!(
                var = %config.api_key_env,
                "enrichment enabled but no API key set, using rule-based narrative"
            );
            return Arc::new(RuleBasedEnricher);
        }
    };
    match AiEnricher::new(config, api_key) {
        Ok(enricher) => {
            info!(model = %config.model, "using AI enrichment");
            Arc::new(enricher)
        }
        Err(e) => {
            warn!(error = %e, "failed to set up AI enrichment, using rule-based narrative");
            Arc::new(RuleBasedEnricher)
        }
    }
}

/// Cut `text` to at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

// ---------------------------------------------------------------------------
// Rule-based
// ---------------------------------------------------------------------------

/// Adds nothing; the rule engines' own hypothesis text stands.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedEnricher;

#[async_trait::async_trait]
impl HypothesisEnricher for RuleBasedEnricher {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    async fn classify(&self, _incident: &Incident) -> Result<Option<String>> {
        Ok(None)
    }

    async fn analyze(&self, _incident: &Incident) -> Result<Option<String>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct AiEnricher {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl AiEnricher {
    pub fn new(config: &EnrichmentConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build enrichment HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn request<'a>(&'a self, system: &str, user: String) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user,
                },
            ],
        }
    }

    async fn complete(&self, system: &str, user: String) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(system, user))
            .send()
            .await
            .context("enrichment request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("enrichment endpoint returned HTTP {status}: {body}");
        }

        let body: ChatResponse = response.json().await.context("unparseable enrichment response")?;
        first_content(body)
    }
}

fn first_content(body: ChatResponse) -> Result<String> {
    match body.choices.into_iter().next() {
        Some(choice) => Ok(choice.message.content),
        None => bail!("enrichment response carried no choices"),
    }
}

fn classify_prompt(incident: &Incident) -> String {
    format!(
        "Device: {}\nClaimed Fault: {}\nDetected Anomalies: {}\nDetection Confidence: {:.2}\n",
        incident.device.name,
        incident.claimed_fault,
        serde_json::to_string(&incident.metric_deviations).unwrap_or_default(),
        incident.detection_confidence,
    )
}

fn analyze_prompt(incident: &Incident) -> String {
    format!(
        "Incident Analysis Request:\n\
         - Device: {} ({})\n\
         - Fault Type: {}\n\
         - Severity: {}\n\
         - Metric Deviations: {}\n\
         - Initial Detection Confidence: {:.2}\n\n\
         Please provide:\n\
         1. Root cause hypothesis\n\
         2. Supporting evidence\n\
         3. Recommended remediation steps\n\
         4. Risk assessment\n",
        incident.device.name,
        incident.device.device_type,
        incident.fault_type,
        incident.severity,
        serde_json::to_string(&incident.metric_deviations).unwrap_or_default(),
        incident.detection_confidence,
    )
}

#[async_trait::async_trait]
impl HypothesisEnricher for AiEnricher {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn classify(&self, incident: &Incident) -> Result<Option<String>> {
        self.complete(CLASSIFY_SYSTEM_PROMPT, classify_prompt(incident))
            .await
            .map(Some)
    }

    async fn analyze(&self, incident: &Incident) -> Result<Option<String>> {
        self.complete(ANALYZE_SYSTEM_PROMPT, analyze_prompt(incident))
            .await
            .map(Some)
    }
}
