//! Hosting-side run management: the shared incident registry and the
//! bounded worker pool that executes background runs.

pub mod pool;
pub mod registry;

pub use self::pool::WorkerPool;
pub use self::registry::{IncidentRegistry, RunStatus};
