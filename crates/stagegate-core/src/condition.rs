//! Stage entry predicates.
//!
//! Predicates are a closed enum so they stay pure: they can only read
//! `RunParameters` and the promotion rank reached so far.

use serde::{Deserialize, Serialize};

use crate::domain::{Environment, RunFlag, RunParameters, RunState, StageDefinition};

/// Entry predicate of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntryCondition {
    Always,
    /// Target environment rank is at least the given environment.
    TargetAtLeast(Environment),
    FlagSet(RunFlag),
    /// The run has already promoted into at least the given environment.
    RankReached(Environment),
    All(Vec<EntryCondition>),
}

impl EntryCondition {
    pub fn evaluate(&self, params: &RunParameters, promotion_rank: Option<Environment>) -> bool {
        match self {
            EntryCondition::Always => true,
            EntryCondition::TargetAtLeast(env) => params.target_env >= *env,
            EntryCondition::FlagSet(flag) => params.flag(*flag),
            EntryCondition::RankReached(env) => promotion_rank.is_some_and(|rank| rank >= *env),
            EntryCondition::All(conditions) => conditions
                .iter()
                .all(|c| c.evaluate(params, promotion_rank)),
        }
    }
}

/// Decide whether `stage` runs for this run.
pub fn should_run(stage: &StageDefinition, params: &RunParameters, state: &RunState) -> bool {
    stage.condition.evaluate(params, state.promotion_rank())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::StaticAction;
    use crate::domain::{StageKind, StageResult};
    use std::sync::Arc;
    use uuid::Uuid;

    fn stage(condition: EntryCondition) -> StageDefinition {
        StageDefinition::new(
            StageKind::DeployStaging,
            condition,
            Arc::new(StaticAction::new(StageResult::success())),
        )
    }

    #[test]
    fn test_always() {
        let params = RunParameters::new(Environment::Dev);
        assert!(EntryCondition::Always.evaluate(&params, None));
    }

    #[test]
    fn test_target_at_least() {
        let cond = EntryCondition::TargetAtLeast(Environment::Staging);
        assert!(!cond.evaluate(&RunParameters::new(Environment::Dev), None));
        assert!(cond.evaluate(&RunParameters::new(Environment::Staging), None));
        assert!(cond.evaluate(&RunParameters::new(Environment::Prod), None));
    }

    #[test]
    fn test_flag_set() {
        let cond = EntryCondition::FlagSet(RunFlag::ComplianceCheck);
        let params = RunParameters::new(Environment::Dev);
        assert!(cond.evaluate(&params, None));
        assert!(!cond.evaluate(&params.with_compliance_check(false), None));
    }

    #[test]
    fn test_rank_reached() {
        let cond = EntryCondition::RankReached(Environment::Staging);
        let params = RunParameters::new(Environment::Prod);
        assert!(!cond.evaluate(&params, None));
        assert!(!cond.evaluate(&params, Some(Environment::Dev)));
        assert!(cond.evaluate(&params, Some(Environment::Staging)));
    }

    #[test]
    fn test_all_requires_every_condition() {
        let cond = EntryCondition::All(vec![
            EntryCondition::TargetAtLeast(Environment::Prod),
            EntryCondition::RankReached(Environment::Staging),
        ]);
        let params = RunParameters::new(Environment::Prod);
        assert!(!cond.evaluate(&params, Some(Environment::Dev)));
        assert!(cond.evaluate(&params, Some(Environment::Staging)));
        assert!(!cond.evaluate(&RunParameters::new(Environment::Staging), Some(Environment::Staging)));
    }

    #[test]
    fn test_should_run_reads_state_rank() {
        let s = stage(EntryCondition::RankReached(Environment::Dev));
        let params = RunParameters::new(Environment::Staging);
        let fresh = RunState::new(Uuid::new_v4());
        let promoted = RunState::new(Uuid::new_v4()).with_promotion_rank(Environment::Dev);
        assert!(!should_run(&s, &params, &fresh));
        assert!(should_run(&s, &params, &promoted));
    }

    #[test]
    fn test_should_run_is_idempotent() {
        let s = stage(EntryCondition::All(vec![
            EntryCondition::TargetAtLeast(Environment::Staging),
            EntryCondition::FlagSet(RunFlag::SecurityScan),
        ]));
        let params = RunParameters::new(Environment::Staging);
        let state = RunState::new(Uuid::new_v4());
        let first = should_run(&s, &params, &state);
        let second = should_run(&s, &params, &state);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_condition_serde_shape() {
        let json =
            serde_json::to_value(EntryCondition::TargetAtLeast(Environment::Prod)).expect("serialize");
        assert_eq!(json["kind"], "target_at_least");
        assert_eq!(json["value"], "prod");
    }
}
