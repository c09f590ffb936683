//! Structured lifecycle events for pipeline runs.
//!
//! Every run executes inside [`run_span`], so stage-level events carry the
//! `run_id` automatically. Events are emitted at `info!` unless noted;
//! set `RUST_LOG` to filter and pass `--json` to the CLI for JSON lines.

use tracing::{info, warn};

use crate::approval::{ApprovalRequest, ApprovalResolution};
use crate::domain::{RunStatus, StageKind, Verdict};

/// Run-scoped span; attach with `tracing::Instrument` so the run's events
/// carry its id across `.await` points.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("stagegate.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, job_name: &str, build_number: u64, target_env: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        job = %job_name,
        build = build_number,
        target_env = %target_env,
    );
}

pub fn emit_stage_skipped(stage: StageKind) {
    info!(event = "stage.skipped", stage = %stage);
}

pub fn emit_stage_started(stage: StageKind, step: &str) {
    info!(event = "stage.started", stage = %stage, step = %step);
}

/// Emit the verdict of one classified step.
pub fn emit_stage_classified(step: &str, verdict: &Verdict, duration_ms: u64) {
    match verdict {
        Verdict::Continue => info!(
            event = "stage.classified",
            step = %step,
            verdict = "continue",
            duration_ms = duration_ms,
        ),
        Verdict::Warn { finding } => warn!(
            event = "stage.classified",
            step = %step,
            verdict = "warn",
            finding = %finding,
            duration_ms = duration_ms,
        ),
        Verdict::Abort { reason } => warn!(
            event = "stage.classified",
            step = %step,
            verdict = "abort",
            reason = %reason,
            duration_ms = duration_ms,
        ),
    }
}

/// Emit event: the delegated tool could not be invoked (warning level).
pub fn emit_tool_invocation_failed(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.invocation_failed", step = %step, error = %error);
}

pub fn emit_approval_requested(request: &ApprovalRequest) {
    info!(
        event = "approval.requested",
        request_id = %request.request_id,
        stage = %request.stage,
        environment = %request.environment,
        timeout_secs = request.timeout.as_secs(),
        deadline = %request.deadline,
    );
}

pub fn emit_approval_resolved(request: &ApprovalRequest, resolution: &ApprovalResolution) {
    let outcome = match resolution {
        ApprovalResolution::Approved { .. } => "approved",
        ApprovalResolution::Rejected { .. } => "rejected",
        ApprovalResolution::TimedOut { .. } => "timed_out",
    };
    info!(
        event = "approval.resolved",
        request_id = %request.request_id,
        environment = %request.environment,
        outcome = outcome,
    );
}

pub fn emit_run_finished(run_id: &str, status: RunStatus, duration_ms: u64, stages_recorded: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        status = status.name(),
        duration_ms = duration_ms,
        stages_recorded = stages_recorded,
    );
}

pub fn emit_notification_dispatched(rule: &str, subject: &str) {
    info!(event = "notification.dispatched", rule = %rule, subject = %subject);
}

/// Emit event: a post-run action failed (warning level).
pub fn emit_post_run_error(action: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.post_run_error", action = %action, error = %error);
}
