use std::sync::Arc;

use crate::config::HealConfig;
use crate::scheduler::WorkerPool;

/// Shared handler state: the worker pool (which owns the registry and the
/// orchestrator) and the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    pub pool: WorkerPool,
    pub config: Arc<HealConfig>,
}
