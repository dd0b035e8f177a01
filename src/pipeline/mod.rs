//! Incident healing pipeline: guards, enrichment and the orchestrator.

pub mod enrichment;
pub mod guards;
pub mod orchestrator;

use thiserror::Error;

pub use self::enrichment::{AiEnricher, HypothesisEnricher, RuleBasedEnricher};
pub use self::orchestrator::Orchestrator;

use crate::incident::{IllegalTransition, Stage};

/// Failures that end a run in the `failed_error` stage.
///
/// Never returned to callers of [`Orchestrator::run`]; the orchestrator
/// converts them into incident data at its boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {error:#}")]
    Collaborator { stage: Stage, error: anyhow::Error },

    #[error("{stage} stage exceeded its {secs}s timeout")]
    StageTimeout { stage: Stage, secs: u64 },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("{stage} stage panicked: {message}")]
    Panicked { stage: Stage, message: String },

    #[error("worker lost: {0}")]
    WorkerLost(String),
}

impl PipelineError {
    pub fn collaborator(stage: Stage, error: anyhow::Error) -> Self {
        Self::Collaborator { stage, error }
    }

    /// Wrap a caught unwind payload.
    pub fn panicked(stage: Stage, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::Panicked { stage, message }
    }
}
