//! netheal -- autonomous incident healing for SONiC network fabrics.
//!
//! This crate provides the healing pipeline (detection, root-cause analysis,
//! remediation, verification), the collaborator adapters it drives, and the
//! HTTP service that triggers and tracks incident runs.

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod incident;
pub mod pipeline;
pub mod remediate;
pub mod scheduler;
pub mod tools;
pub mod verify;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::HealConfig;
use crate::pipeline::Orchestrator;
use crate::scheduler::{IncidentRegistry, WorkerPool};
use crate::tools::Toolset;

/// Assemble an orchestrator with the collaborators and enrichment the
/// configuration selects.
pub fn orchestrator(config: &HealConfig) -> Result<Orchestrator> {
    let tools = Toolset::from_config(&config.tools)?;
    let enricher = pipeline::enrichment::from_config(&config.enrichment);
    Ok(Orchestrator::new(tools, config.pipeline.clone()).with_enricher(enricher))
}

pub fn app_state(config: HealConfig) -> Result<AppState> {
    let orchestrator = Arc::new(orchestrator(&config)?);
    let registry = IncidentRegistry::with_retention(config.server.completed_retention);
    let pool = WorkerPool::new(orchestrator, registry, config.server.max_workers);
    Ok(AppState {
        pool,
        config: Arc::new(config),
    })
}

/// Start the netheal daemon: worker pool, registry and API server.
pub async fn serve(config: HealConfig) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;

    tracing::info!(
        tools = %Toolset::describe(&config.tools),
        max_workers = config.server.max_workers,
        "initializing incident pipeline"
    );
    let app = api::router(app_state(config)?);

    tracing::info!(%addr, "netheal listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
