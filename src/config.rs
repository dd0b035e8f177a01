//! TOML configuration for the netheal daemon.
//!
//! Every section falls back to compiled-in defaults, so an empty file (or
//! no file at all) yields a working simulated lab setup.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "NETHEAL_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/netheal/netheal.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HealConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded netheal configuration");
        Ok(config)
    }

    /// Resolve configuration for a process start.
    ///
    /// An explicit path must load. Otherwise `NETHEAL_CONFIG`, then
    /// `/etc/netheal/netheal.toml`, then defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "NETHEAL_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP listener and background worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Upper bound on concurrently running background incidents.
    pub max_workers: usize,
    /// Completed reports kept for status queries; the oldest are evicted.
    pub completed_retention: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5001".to_string(),
            max_workers: 5,
            completed_retention: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause after each remediation action.
    pub action_settle_ms: u64,
    /// Pause before the first verification query.
    pub verification_settle_ms: u64,
    /// Wall-clock limit per stage. Unset means stages may run indefinitely.
    pub stage_timeout_sec: Option<u64>,
    /// Revert reversible actions when verification fails.
    pub rollback_on_failure: bool,
    /// After a passing verification, keep re-verifying for this long and
    /// record a stability score. Unset skips the observation.
    pub stability_window_ms: Option<u64>,
    /// Gap between stability samples.
    pub stability_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            action_settle_ms: 500,
            verification_settle_ms: 1000,
            stage_timeout_sec: None,
            rollback_on_failure: false,
            stability_window_ms: None,
            stability_interval_ms: 10_000,
        }
    }
}

impl PipelineConfig {
    pub fn action_settle(&self) -> Duration {
        Duration::from_millis(self.action_settle_ms)
    }

    pub fn verification_settle(&self) -> Duration {
        Duration::from_millis(self.verification_settle_ms)
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_sec.map(Duration::from_secs)
    }

    pub fn stability_window(&self) -> Option<Duration> {
        self.stability_window_ms.map(Duration::from_millis)
    }

    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_interval_ms)
    }

    /// No settle delays.
    pub fn immediate() -> Self {
        Self {
            action_settle_ms: 0,
            verification_settle_ms: 0,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Collaborator endpoints. Anything not enabled runs against the lab
/// simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub prometheus_enabled: bool,
    pub prometheus_url: String,
    pub gns3_enabled: bool,
    pub gns3_url: String,
    pub gns3_project_id: String,
    pub gns3_username: Option<String>,
    pub gns3_password: Option<String>,
    pub sonic_enabled: bool,
    /// Reach the switch over ssh instead of a local vtysh.
    pub sonic_device_ip: Option<String>,
    pub request_timeout_sec: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_url: "http://localhost:9090".to_string(),
            gns3_enabled: false,
            gns3_url: "http://localhost:3080".to_string(),
            gns3_project_id: String::new(),
            gns3_username: None,
            gns3_password: None,
            sonic_enabled: false,
            sonic_device_ip: None,
            request_timeout_sec: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Optional narrative enrichment through an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. The key itself never
    /// lives in the config file.
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.3,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = HealConfig::default();

        assert_eq!(cfg.server.bind, "0.0.0.0:5001");
        assert_eq!(cfg.server.max_workers, 5);
        assert_eq!(cfg.server.completed_retention, 1000);

        assert_eq!(cfg.pipeline.action_settle(), Duration::from_millis(500));
        assert_eq!(cfg.pipeline.verification_settle(), Duration::from_secs(1));
        assert!(cfg.pipeline.stage_timeout().is_none());
        assert!(!cfg.pipeline.rollback_on_failure);
        assert!(cfg.pipeline.stability_window().is_none());
        assert_eq!(cfg.pipeline.stability_interval(), Duration::from_secs(10));

        assert!(!cfg.tools.prometheus_enabled);
        assert_eq!(cfg.tools.prometheus_url, "http://localhost:9090");
        assert!(!cfg.tools.gns3_enabled);
        assert_eq!(cfg.tools.gns3_url, "http://localhost:3080");
        assert!(cfg.tools.gns3_username.is_none());
        assert!(!cfg.tools.sonic_enabled);
        assert_eq!(cfg.tools.request_timeout_sec, 10);

        assert!(!cfg.enrichment.enabled);
        assert_eq!(cfg.enrichment.model, "gpt-4o");
        assert_eq!(cfg.enrichment.api_key_env, "OPENAI_API_KEY");

        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:8080"
max_workers = 2
completed_retention = 50

[pipeline]
action_settle_ms = 0
verification_settle_ms = 250
stage_timeout_sec = 30
rollback_on_failure = true
stability_window_ms = 60000
stability_interval_ms = 5000

[tools]
prometheus_enabled = true
prometheus_url = "http://prom.lab:9090"
gns3_enabled = true
gns3_project_id = "4a1f"
gns3_username = "admin"
gns3_password = "secret"
sonic_enabled = true
sonic_device_ip = "10.1.1.1"

[enrichment]
enabled = true
model = "gpt-4o-mini"
temperature = 0.1

[logging]
level = "debug"
json = true
"#;

        let cfg: HealConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert_eq!(cfg.server.max_workers, 2);
        assert_eq!(cfg.server.completed_retention, 50);
        assert_eq!(cfg.pipeline.action_settle(), Duration::ZERO);
        assert_eq!(cfg.pipeline.verification_settle(), Duration::from_millis(250));
        assert_eq!(cfg.pipeline.stage_timeout(), Some(Duration::from_secs(30)));
        assert!(cfg.pipeline.rollback_on_failure);
        assert_eq!(cfg.pipeline.stability_window(), Some(Duration::from_secs(60)));
        assert_eq!(cfg.pipeline.stability_interval(), Duration::from_secs(5));
        assert!(cfg.tools.prometheus_enabled);
        assert_eq!(cfg.tools.prometheus_url, "http://prom.lab:9090");
        assert_eq!(cfg.tools.gns3_project_id, "4a1f");
        assert_eq!(cfg.tools.gns3_password.as_deref(), Some("secret"));
        assert_eq!(cfg.tools.sonic_device_ip.as_deref(), Some("10.1.1.1"));
        assert!(cfg.enrichment.enabled);
        assert_eq!(cfg.enrichment.model, "gpt-4o-mini");
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[pipeline]
rollback_on_failure = true
"#;
        let cfg: HealConfig = toml::from_str(toml_str).unwrap();

        assert!(cfg.pipeline.rollback_on_failure);
        assert_eq!(cfg.pipeline.action_settle_ms, 500);
        assert_eq!(cfg.server.bind, "0.0.0.0:5001");
        assert_eq!(cfg.tools.request_timeout_sec, 10);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: HealConfig = toml::from_str("").unwrap();
        let defaults = HealConfig::default();

        assert_eq!(cfg.server.bind, defaults.server.bind);
        assert_eq!(cfg.pipeline.verification_settle_ms, defaults.pipeline.verification_settle_ms);
        assert_eq!(cfg.enrichment.api_key_env, defaults.enrichment.api_key_env);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("netheal.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9999"
"#,
        )
        .unwrap();

        let cfg = HealConfig::load(&path).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9999");

        let cfg = HealConfig::discover(Some(&path)).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9999");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let missing = Path::new("/nonexistent/path/netheal.toml");
        assert!(HealConfig::load(missing).is_err());
        assert!(HealConfig::discover(Some(missing)).is_err());
    }

    #[test]
    fn test_malformed_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server]\nmax_workers = \"many\"\n").unwrap();
        assert!(HealConfig::load(&path).is_err());
    }
}
