//! Domain model for pipeline runs.

pub mod error;
pub mod params;
pub mod result;
pub mod stage;
pub mod state;
pub mod verdict;

pub use error::{PipelineError, Result, ToolInvocationError};
pub use params::{Environment, RunFlag, RunParameters};
pub use result::{FindingCounts, StageResult, StageStatus};
pub use stage::{FailurePolicy, StageDefinition, StageKind};
pub use state::{
    RecordedArtifact, RunState, RunStatus, StageOutcome, StageRecord, StepOutcome,
};
pub use verdict::Verdict;
