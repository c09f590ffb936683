//! Stagegate Core Library
//!
//! Staged deployment pipeline orchestration: a fixed stage sequence with
//! entry conditions, severity-aware result classification, approval gates on
//! promotions, guaranteed artifact archival and run notifications.

pub mod action;
pub mod approval;
pub mod archive;
pub mod classifier;
pub mod condition;
pub mod config;
pub mod domain;
pub mod engine;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use domain::{
    Environment, FailurePolicy, FindingCounts, PipelineError, RecordedArtifact,
    Result, RunFlag, RunParameters, RunState, RunStatus, StageDefinition, StageKind,
    StageOutcome, StageRecord, StageResult, StageStatus, StepOutcome, ToolInvocationError,
    Verdict,
};

pub use action::{CommandAction, ParallelAction, StageAction, StageContext, StaticAction};
pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalInbox, ApprovalRequest, ApprovalResolution,
    PendingApproval,
};
pub use archive::{ArchiveStatus, ArchiveTarget, ArchivedArtifact, Archiver, FsArchiver};
pub use classifier::{classify, classify_with};
pub use condition::{should_run, EntryCondition};
pub use config::{
    ApprovalTimeouts, CommandSpec, DeployCommandSpec, PipelineConfig, StageCommands,
};
pub use engine::{DeployActions, PipelineEngine, StageActions};
pub use notify::{
    LogNotifier, NotificationDispatcher, NotificationIntent, NotificationRule, Notifier,
};
pub use report::{
    render_report_md, write_report_json, write_report_md, ApprovalRecord, RunReport,
};
pub use runner::StageRunner;

pub use metrics::METRICS;
pub use obs::run_span;
pub use telemetry::init_tracing;

/// Stagegate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
