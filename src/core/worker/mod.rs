// ─── Worker Boundary ───
// Transforms cross this boundary as a request value and come back as an
// outcome or an error. The orchestrator never assumes where they run.

pub mod pool;
pub mod request;
pub mod runner;

pub use pool::WorkerPool;
pub use request::{ExternalTool, MergePlan, TransformKind, TransformOutcome, TransformRequest};
pub use runner::{TransformRunner, LOG_CONFIG_ENV};
