//! Severity-aware classification of stage results.
//!
//! Rule precedence:
//! 1. `failure` status under `FatalOnError` aborts.
//! 2. Any critical finding aborts.
//! 3. Non-critical findings warn, and the run becomes unstable.
//! 4. `failure` status under `WarnOnError` warns.
//! 5. Otherwise continue.

use crate::domain::{
    FailurePolicy, StageDefinition, StageResult, StageStatus, Verdict,
};

/// Classify a stage body's result using the stage's failure policy.
pub fn classify(stage: &StageDefinition, result: &StageResult) -> Verdict {
    classify_with(stage.name(), stage.failure_policy, result)
}

/// Classify a result for a named step with an explicit failure policy.
pub fn classify_with(step: &str, failure_policy: FailurePolicy, result: &StageResult) -> Verdict {
    let failed = result.status == StageStatus::Failure;
    let counts = result.counts;

    if failed && failure_policy == FailurePolicy::FatalOnError {
        return Verdict::abort(if counts.is_clean() {
            format!("{} failed", step)
        } else {
            format!(
                "{} failed with {} finding(s), {} critical",
                step, counts.total, counts.critical
            )
        });
    }

    if counts.critical > 0 {
        return Verdict::abort(format!(
            "{} reported {} critical finding(s) ({} total)",
            step, counts.critical, counts.total
        ));
    }

    if counts.total > 0 {
        return Verdict::warn(format!(
            "{} reported {} non-critical finding(s)",
            step, counts.total
        ));
    }

    if failed {
        return Verdict::warn(format!("{} failed (tolerated by policy)", step));
    }

    Verdict::Continue
}
