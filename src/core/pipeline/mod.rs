// ─── Pipeline ───
// Stage sequencing, skip guards and failure recovery for one `provide` call.

pub mod orchestrator;
pub mod run;

pub use orchestrator::Provisioner;
pub use run::{PipelineRun, Stage, StageOutcome, StageRecord};
