//! Mutable per-run state, owned by the pipeline engine.
//!
//! Other components receive `&RunState` only; every mutator is crate-private
//! and called from the engine as stages complete.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::params::Environment;
use super::result::StageResult;
use super::stage::StageKind;
use super::verdict::Verdict;
use crate::approval::ApprovalResolution;

/// Aggregate status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
    Unstable,
}

impl RunStatus {
    pub fn name(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Unstable => "unstable",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Outcome of one classified step (a stage body or its smoke test).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Classified { result: StageResult, verdict: Verdict },
    InvocationFailed { error: String, verdict: Verdict },
}

impl StepOutcome {
    pub fn verdict(&self) -> &Verdict {
        match self {
            StepOutcome::Classified { verdict, .. } => verdict,
            StepOutcome::InvocationFailed { verdict, .. } => verdict,
        }
    }

    pub fn result(&self) -> Option<&StageResult> {
        match self {
            StepOutcome::Classified { result, .. } => Some(result),
            StepOutcome::InvocationFailed { .. } => None,
        }
    }
}

/// What happened to a stage that was reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Entry condition evaluated false.
    Skipped,
    /// Approval gate resolved without approval; the body never ran.
    NotApproved,
    Ran {
        body: StepOutcome,
        smoke_test: Option<StepOutcome>,
    },
}

/// One entry in the run's stage history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: StageKind,
    pub outcome: StageOutcome,
    /// Effective verdict; `None` for skipped stages.
    pub verdict: Option<Verdict>,
    pub approval: Option<ApprovalResolution>,
}

impl StageRecord {
    pub fn skipped(stage: StageKind) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            verdict: None,
            approval: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, StageOutcome::Skipped)
    }

    /// Whether the stage body (deploy action for promotions) was invoked.
    pub fn body_ran(&self) -> bool {
        matches!(self.outcome, StageOutcome::Ran { .. })
    }
}

/// A raw artifact reported by a stage, recorded before classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedArtifact {
    pub stage: StageKind,
    pub path: PathBuf,
}

/// Per-run mutable state.
#[derive(Debug, Clone)]
pub struct RunState {
    run_id: Uuid,
    status: RunStatus,
    records: Vec<StageRecord>,
    promotion_rank: Option<Environment>,
    artifacts: Vec<RecordedArtifact>,
    findings: Vec<String>,
    abort_reason: Option<String>,
}

impl RunState {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            records: Vec::new(),
            promotion_rank: None,
            artifacts: Vec::new(),
            findings: Vec::new(),
            abort_reason: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn record(&self, stage: StageKind) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }

    /// Highest environment successfully promoted into so far.
    pub fn promotion_rank(&self) -> Option<Environment> {
        self.promotion_rank
    }

    pub fn artifacts(&self) -> &[RecordedArtifact] {
        &self.artifacts
    }

    /// Non-critical findings accumulated from `Warn` verdicts.
    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub(crate) fn push_record(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    pub(crate) fn record_artifacts(&mut self, stage: StageKind, paths: &[PathBuf]) {
        self.artifacts.extend(paths.iter().map(|path| RecordedArtifact {
            stage,
            path: path.clone(),
        }));
    }

    /// Fold a verdict into the aggregate status.
    ///
    /// `Unstable` never reverts to `Success`; `Failure` is absorbing and keeps
    /// the first abort reason.
    pub(crate) fn apply_verdict(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Continue => {}
            Verdict::Warn { finding } => {
                self.findings.push(finding.clone());
                if self.status == RunStatus::Running {
                    self.status = RunStatus::Unstable;
                }
            }
            Verdict::Abort { reason } => {
                if self.abort_reason.is_none() {
                    self.abort_reason = Some(reason.clone());
                }
                self.status = RunStatus::Failure;
            }
        }
    }

    pub(crate) fn raise_promotion_rank(&mut self, env: Environment) {
        if self.promotion_rank.map_or(true, |current| env > current) {
            self.promotion_rank = Some(env);
        }
    }

    /// Settle the terminal status once the sequence has been walked.
    pub(crate) fn finish(&mut self) -> RunStatus {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Success;
        }
        self.status
    }

    #[cfg(test)]
    pub(crate) fn with_promotion_rank(mut self, env: Environment) -> Self {
        self.promotion_rank = Some(env);
        self
    }
}
