//! Stage execution: invoke a body, record its artifacts, classify.

use std::time::Instant;

use crate::action::{StageAction, StageContext};
use crate::classifier::classify_with;
use crate::domain::{
    FailurePolicy, RunState, StageResult, StepOutcome, ToolInvocationError, Verdict,
};
use crate::metrics::METRICS;
use crate::obs::{emit_stage_classified, emit_stage_started, emit_tool_invocation_failed};

/// Executes stage bodies and smoke tests.
pub struct StageRunner;

impl StageRunner {
    /// Invoke a stage body. `Err` only when the tool could not be invoked.
    pub async fn execute(
        action: &dyn StageAction,
        ctx: &StageContext,
    ) -> Result<StageResult, ToolInvocationError> {
        emit_stage_started(ctx.stage, &ctx.step);
        METRICS.inc_stages_executed();
        action.invoke(ctx).await
    }

    /// Execute one step and classify it.
    ///
    /// Raw artifacts go into `state` before the verdict is computed, so an
    /// aborting step still has its output archived. An invocation error
    /// becomes an `Abort` without reaching the classifier; any raw output it
    /// carries is recorded too.
    pub(crate) async fn run_step(
        action: &dyn StageAction,
        ctx: &StageContext,
        failure_policy: FailurePolicy,
        state: &mut RunState,
    ) -> StepOutcome {
        let start = Instant::now();
        match Self::execute(action, ctx).await {
            Ok(result) => {
                state.record_artifacts(ctx.stage, &result.raw_artifact_paths);
                let verdict = classify_with(&ctx.step, failure_policy, &result);
                emit_stage_classified(&ctx.step, &verdict, start.elapsed().as_millis() as u64);
                StepOutcome::Classified { result, verdict }
            }
            Err(error) => {
                state.record_artifacts(ctx.stage, error.artifacts());
                emit_tool_invocation_failed(&ctx.step, &error);
                let verdict =
                    Verdict::abort(format!("{} could not be invoked: {}", ctx.step, error));
                StepOutcome::InvocationFailed {
                    error: error.to_string(),
                    verdict,
                }
            }
        }
    }
}
