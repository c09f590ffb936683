//! Pipeline orchestration.
//!
//! [`PipelineEngine`] walks the fixed stage sequence for one run, owns that
//! run's [`RunState`], and always finalizes: archival, notification and the
//! [`RunReport`] happen whatever the outcome.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::action::{StageAction, StageContext};
use crate::approval::{ApprovalGate, ApprovalRequest, ApprovalResolution};
use crate::archive::{ArchiveTarget, Archiver, FsArchiver};
use crate::condition::{should_run, EntryCondition};
use crate::config::PipelineConfig;
use crate::domain::{
    Environment, FailurePolicy, RunFlag, RunParameters, RunState, RunStatus, StageDefinition,
    StageKind, StageOutcome, StageRecord,
};
use crate::metrics::METRICS;
use crate::notify::{LogNotifier, NotificationDispatcher, Notifier};
use crate::obs::{
    emit_approval_requested, emit_approval_resolved, emit_post_run_error, emit_run_finished,
    emit_run_started, emit_stage_skipped, run_span,
};
use crate::report::{ApprovalRecord, RunReport};
use crate::runner::StageRunner;

/// Body and optional smoke test of a deploy stage.
#[derive(Clone)]
pub struct DeployActions {
    pub deploy: Arc<dyn StageAction>,
    pub smoke_test: Option<Arc<dyn StageAction>>,
}

impl DeployActions {
    pub fn new(deploy: Arc<dyn StageAction>) -> Self {
        Self {
            deploy,
            smoke_test: None,
        }
    }

    pub fn with_smoke_test(mut self, smoke_test: Arc<dyn StageAction>) -> Self {
        self.smoke_test = Some(smoke_test);
        self
    }
}

/// One body per stage of the fixed sequence.
#[derive(Clone)]
pub struct StageActions {
    pub validate: Arc<dyn StageAction>,
    pub unit_test: Arc<dyn StageAction>,
    pub integration_test: Arc<dyn StageAction>,
    pub compliance_check: Arc<dyn StageAction>,
    pub security_scan: Arc<dyn StageAction>,
    pub build_package: Arc<dyn StageAction>,
    pub deploy_dev: DeployActions,
    pub deploy_staging: DeployActions,
    pub deploy_prod: DeployActions,
}

impl StageActions {
    /// Every stage backed by the same action, without smoke tests.
    pub fn uniform(action: Arc<dyn StageAction>) -> Self {
        Self {
            validate: action.clone(),
            unit_test: action.clone(),
            integration_test: action.clone(),
            compliance_check: action.clone(),
            security_scan: action.clone(),
            build_package: action.clone(),
            deploy_dev: DeployActions::new(action.clone()),
            deploy_staging: DeployActions::new(action.clone()),
            deploy_prod: DeployActions::new(action),
        }
    }
}

/// Build the fixed stage sequence with its entry conditions and policies.
fn build_stages(config: &PipelineConfig, actions: StageActions) -> Vec<StageDefinition> {
    let gate = |def: StageDefinition, env: Environment| match config.approval_timeout(env) {
        Some(timeout) => def.gated(timeout),
        None => def,
    };

    vec![
        StageDefinition::new(StageKind::Validate, EntryCondition::Always, actions.validate),
        StageDefinition::new(StageKind::UnitTest, EntryCondition::Always, actions.unit_test),
        StageDefinition::new(
            StageKind::IntegrationTest,
            EntryCondition::Always,
            actions.integration_test,
        ),
        StageDefinition::new(
            StageKind::ComplianceCheck,
            EntryCondition::FlagSet(RunFlag::ComplianceCheck),
            actions.compliance_check,
        )
        .with_failure_policy(FailurePolicy::WarnOnError),
        StageDefinition::new(
            StageKind::SecurityScan,
            EntryCondition::FlagSet(RunFlag::SecurityScan),
            actions.security_scan,
        )
        .with_failure_policy(FailurePolicy::WarnOnError),
        StageDefinition::new(
            StageKind::BuildPackage,
            EntryCondition::Always,
            actions.build_package,
        ),
        StageDefinition::new(
            StageKind::DeployDev,
            EntryCondition::TargetAtLeast(Environment::Dev),
            actions.deploy_dev.deploy,
        )
        .with_smoke_test(actions.deploy_dev.smoke_test),
        gate(
            StageDefinition::new(
                StageKind::DeployStaging,
                EntryCondition::All(vec![
                    EntryCondition::TargetAtLeast(Environment::Staging),
                    EntryCondition::RankReached(Environment::Dev),
                ]),
                actions.deploy_staging.deploy,
            )
            .with_smoke_test(actions.deploy_staging.smoke_test),
            Environment::Staging,
        ),
        gate(
            StageDefinition::new(
                StageKind::DeployProd,
                EntryCondition::All(vec![
                    EntryCondition::TargetAtLeast(Environment::Prod),
                    EntryCondition::RankReached(Environment::Staging),
                ]),
                actions.deploy_prod.deploy,
            )
            .with_smoke_test(actions.deploy_prod.smoke_test),
            Environment::Prod,
        ),
    ]
}

/// Drives runs through the stage sequence.
///
/// The engine holds no per-run state, so one instance can drive many runs
/// concurrently; each `run` call owns its own `RunState`.
pub struct PipelineEngine {
    config: PipelineConfig,
    stages: Vec<StageDefinition>,
    gate: ApprovalGate,
    archiver: Option<Arc<dyn Archiver>>,
    notifier: Arc<dyn Notifier>,
}

impl PipelineEngine {
    /// Archives into `config.archive_dir` when set and notifies through the log.
    pub fn new(config: PipelineConfig, actions: StageActions, gate: ApprovalGate) -> Self {
        let stages = build_stages(&config, actions);
        let archiver = config
            .archive_dir
            .as_ref()
            .map(|dir| Arc::new(FsArchiver::new(dir)) as Arc<dyn Archiver>);
        Self {
            config,
            stages,
            gate,
            archiver,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Engine whose stage bodies are the configured commands.
    pub fn from_config(config: PipelineConfig, gate: ApprovalGate) -> Self {
        let actions = config.stage_actions();
        Self::new(config, actions, gate)
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Which stages would run, assuming every stage succeeds and every
    /// approval is granted.
    pub fn plan(&self, params: &RunParameters) -> Vec<(StageKind, bool)> {
        let mut state = RunState::new(Uuid::nil());
        self.stages
            .iter()
            .map(|stage| {
                let runs = should_run(stage, params, &state);
                if runs {
                    if let Some(env) = stage.kind.promotion_env() {
                        state.raise_promotion_rank(env);
                    }
                }
                (stage.kind, runs)
            })
            .collect()
    }

    /// Execute one run to completion.
    pub async fn run(&self, params: RunParameters) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = run_span(&run_id.to_string());
        self.execute(run_id, params).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, params: RunParameters) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let version_tag = params.resolved_version_tag(started_at.date_naive());

        emit_run_started(
            &run_id.to_string(),
            &params.job_name,
            params.build_number,
            params.target_env.name(),
        );

        let mut state = RunState::new(run_id);
        let mut approvals = Vec::new();

        for stage in &self.stages {
            // Stages after an abort are never reached, not skipped.
            if state.status() == RunStatus::Failure {
                break;
            }

            if !should_run(stage, &params, &state) {
                emit_stage_skipped(stage.kind);
                METRICS.inc_stages_skipped();
                state.push_record(StageRecord::skipped(stage.kind));
                continue;
            }

            let ctx = StageContext {
                run_id,
                stage: stage.kind,
                step: stage.name().to_string(),
                target_env: params.target_env,
                version_tag: version_tag.clone(),
                job_name: params.job_name.clone(),
                build_number: params.build_number,
            };

            let mut approval = None;
            if stage.gated {
                let resolution = self
                    .request_approval(stage, &params, &version_tag, run_id, &mut approvals)
                    .await;
                if !resolution.is_approved() {
                    let verdict = resolution.verdict(stage.kind);
                    state.apply_verdict(&verdict);
                    state.push_record(StageRecord {
                        stage: stage.kind,
                        outcome: StageOutcome::NotApproved,
                        verdict: Some(verdict),
                        approval: Some(resolution),
                    });
                    continue;
                }
                approval = Some(resolution);
            }

            let body = StageRunner::run_step(
                stage.body.as_ref(),
                &ctx,
                stage.failure_policy,
                &mut state,
            )
            .await;
            state.apply_verdict(body.verdict());
            let mut verdict = body.verdict().clone();

            let mut smoke_test = None;
            if let Some(action) = stage.smoke_test.as_ref().filter(|_| !verdict.is_abort()) {
                let smoke_ctx = StageContext {
                    step: format!("{} smoke test", stage.name()),
                    ..ctx.clone()
                };
                let outcome = StageRunner::run_step(
                    action.as_ref(),
                    &smoke_ctx,
                    FailurePolicy::FatalOnError,
                    &mut state,
                )
                .await;
                state.apply_verdict(outcome.verdict());
                verdict = verdict.worst(outcome.verdict().clone());
                smoke_test = Some(outcome);
            }

            if let Some(env) = stage.kind.promotion_env() {
                if verdict.allows_advance() {
                    state.raise_promotion_rank(env);
                }
            }

            state.push_record(StageRecord {
                stage: stage.kind,
                outcome: StageOutcome::Ran { body, smoke_test },
                verdict: Some(verdict),
                approval,
            });
        }

        self.finalize(state, params, version_tag, approvals, started_at, start)
            .await
    }

    async fn request_approval(
        &self,
        stage: &StageDefinition,
        params: &RunParameters,
        version_tag: &str,
        run_id: Uuid,
        approvals: &mut Vec<ApprovalRecord>,
    ) -> ApprovalResolution {
        let environment = stage.kind.promotion_env().unwrap_or(params.target_env);
        let timeout = stage
            .approval_timeout
            .or_else(|| self.config.approval_timeout(environment))
            .unwrap_or_default();
        let request = ApprovalRequest::new(
            run_id,
            stage.kind,
            environment,
            format!(
                "Promote {} #{} ({}) to {}?",
                params.job_name, params.build_number, version_tag, environment
            ),
            timeout,
            Utc::now(),
        );

        emit_approval_requested(&request);
        METRICS.inc_approvals_requested();

        let resolution = self.gate.await_approval(request.clone()).await;
        emit_approval_resolved(&request, &resolution);
        if matches!(resolution, ApprovalResolution::TimedOut { .. }) {
            METRICS.inc_approvals_timed_out();
        }

        approvals.push(ApprovalRecord {
            request,
            resolution: resolution.clone(),
        });
        resolution
    }

    async fn finalize(
        &self,
        mut state: RunState,
        params: RunParameters,
        version_tag: String,
        approvals: Vec<ApprovalRecord>,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
    ) -> RunReport {
        let status = state.finish();
        let mut post_run_errors = Vec::new();

        let archived = match &self.archiver {
            Some(archiver) => {
                let target = ArchiveTarget {
                    run_id: state.run_id(),
                    job_name: params.job_name.clone(),
                    build_number: params.build_number,
                };
                match archiver.archive(&target, state.artifacts()).await {
                    Ok(archived) => archived,
                    Err(e) => {
                        emit_post_run_error("archive", &e);
                        post_run_errors.push(format!("archive: {}", e));
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let details = match state.abort_reason() {
            Some(reason) => vec![reason.to_string()],
            None => state.findings().to_vec(),
        };
        let run_url = self.config.run_url(&params.job_name, params.build_number);
        let mut dispatcher = NotificationDispatcher::new(version_tag.clone(), run_url.clone());
        let notification = dispatcher.notify(status, &params, &details);
        if let Some(intent) = &notification {
            match self.notifier.send(intent).await {
                Ok(()) => METRICS.inc_notifications_sent(),
                Err(e) => {
                    emit_post_run_error("notify", &e);
                    post_run_errors.push(format!("notify: {}", e));
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        METRICS.inc_runs_finished();
        METRICS.flush();
        emit_run_finished(
            &state.run_id().to_string(),
            status,
            duration_ms,
            state.records().len(),
        );

        RunReport {
            run_id: state.run_id(),
            params,
            version_tag,
            status,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            stages: state.records().to_vec(),
            abort_reason: state.abort_reason().map(str::to_string),
            findings: state.findings().to_vec(),
            artifacts: state.artifacts().to_vec(),
            archived,
            approvals,
            notification,
            run_url,
            post_run_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::StaticAction;
    use crate::domain::StageResult;

    fn engine() -> PipelineEngine {
        PipelineEngine::new(
            PipelineConfig::default(),
            StageActions::uniform(Arc::new(StaticAction::new(StageResult::success()))),
            ApprovalGate::detached(),
        )
    }

    #[test]
    fn test_sequence_matches_stage_order() {
        let kinds: Vec<_> = engine().stages().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, StageKind::SEQUENCE.to_vec());
    }

    #[test]
    fn test_policies_per_stage() {
        let e = engine();
        let by_kind = |kind: StageKind| {
            e.stages()
                .iter()
                .find(|s| s.kind == kind)
                .expect("stage present")
        };
        assert_eq!(
            by_kind(StageKind::UnitTest).failure_policy,
            FailurePolicy::FatalOnError
        );
        assert_eq!(
            by_kind(StageKind::SecurityScan).failure_policy,
            FailurePolicy::WarnOnError
        );
        assert!(!by_kind(StageKind::DeployDev).gated);
        assert_eq!(
            by_kind(StageKind::DeployProd).approval_timeout,
            Some(std::time::Duration::from_secs(86_400))
        );
    }

    #[test]
    fn test_plan_for_staging_without_scans() {
        let params = RunParameters::new(Environment::Staging)
            .with_security_scan(false)
            .with_compliance_check(false);
        let plan = engine().plan(&params);
        let running: Vec<_> = plan.iter().filter(|(_, r)| *r).map(|(k, _)| *k).collect();
        assert_eq!(
            running,
            vec![
                StageKind::Validate,
                StageKind::UnitTest,
                StageKind::IntegrationTest,
                StageKind::BuildPackage,
                StageKind::DeployDev,
                StageKind::DeployStaging,
            ]
        );
    }

    #[test]
    fn test_plan_for_prod_runs_everything() {
        let plan = engine().plan(&RunParameters::new(Environment::Prod));
        assert!(plan.iter().all(|(_, runs)| *runs));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_send_sync() {
        assert_send_sync::<PipelineEngine>();
    }
}
