//! Stage bodies: delegated tool invocations that produce a `StageResult`.

use async_trait::async_trait;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Environment, FindingCounts, StageKind, StageResult, StageStatus, ToolInvocationError,
};

/// Context handed to every stage body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContext {
    pub run_id: Uuid,
    pub stage: StageKind,
    /// Label of the step (`deploy_prod` or `deploy_prod smoke test`).
    pub step: String,
    pub target_env: Environment,
    pub version_tag: String,
    pub job_name: String,
    pub build_number: u64,
}

/// A delegated stage body.
#[async_trait]
pub trait StageAction: Send + Sync {
    /// Invoke the tool. `Err` only when it could not be invoked at all.
    async fn invoke(&self, ctx: &StageContext) -> Result<StageResult, ToolInvocationError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        "action".to_string()
    }
}

/// Runs an external command and reads an optional JSON result file.
///
/// Exit status 0 maps to `success`. The result file, if present, supplies
/// `{"total": n, "critical": m}`; it and every declared artifact are
/// reported as raw artifacts.
#[derive(Debug, Clone)]
pub struct CommandAction {
    pub command: Vec<String>,
    pub result_file: Option<PathBuf>,
    pub artifacts: Vec<PathBuf>,
    pub working_dir: Option<PathBuf>,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
}

impl CommandAction {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            result_file: None,
            artifacts: Vec::new(),
            working_dir: None,
            timeout_secs,
        }
    }

    pub fn with_result_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_file = Some(path.into());
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn read_counts(&self, step: &str) -> Result<FindingCounts, ToolInvocationError> {
        let Some(path) = &self.result_file else {
            return Ok(FindingCounts::default());
        };
        let path = self.resolve(path);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(step = %step, path = ?path, "result file not written; assuming no findings");
                return Ok(FindingCounts::default());
            }
            Err(e) => {
                return Err(ToolInvocationError::ResultFile {
                    stage: step.to_string(),
                    path,
                    message: e.to_string(),
                })
            }
        };
        let counts: FindingCounts =
            serde_json::from_slice(&raw).map_err(|e| ToolInvocationError::ResultFile {
                stage: step.to_string(),
                path: path.clone(),
                message: e.to_string(),
            })?;
        Ok(FindingCounts::new(counts.total, counts.critical))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl StageAction for CommandAction {
    async fn invoke(&self, ctx: &StageContext) -> Result<StageResult, ToolInvocationError> {
        let start = Instant::now();

        let Some((exe, args)) = self.command.split_first() else {
            return Err(ToolInvocationError::EmptyCommand {
                stage: ctx.step.clone(),
            });
        };

        let mut command = Command::new(exe);
        command
            .args(args)
            .env("STAGEGATE_RUN_ID", ctx.run_id.to_string())
            .env("STAGEGATE_STAGE", ctx.stage.name())
            .env("STAGEGATE_TARGET_ENV", ctx.target_env.name())
            .env("STAGEGATE_VERSION_TAG", &ctx.version_tag)
            .env("STAGEGATE_JOB_NAME", &ctx.job_name)
            .env("STAGEGATE_BUILD_NUMBER", ctx.build_number.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| ToolInvocationError::Spawn {
            stage: ctx.step.clone(),
            program: exe.clone(),
            message: e.to_string(),
        })?;

        // Declared output may exist even when the invocation itself fails.
        let mut raw_artifact_paths: Vec<PathBuf> =
            self.artifacts.iter().map(|p| self.resolve(p)).collect();
        if let Some(file) = &self.result_file {
            raw_artifact_paths.push(self.resolve(file));
        }
        let keep_output = |e: ToolInvocationError| e.with_artifacts(raw_artifact_paths.clone());

        let waited = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                keep_output(ToolInvocationError::Timeout {
                    stage: ctx.step.clone(),
                    timeout_secs: self.timeout_secs,
                })
            })?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|e| {
            keep_output(ToolInvocationError::Unavailable {
                stage: ctx.step.clone(),
                message: e.to_string(),
            })
        })?;

        debug!(
            step = %ctx.step,
            exit_code = output.status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "command finished"
        );

        let counts = self.read_counts(&ctx.step).await.map_err(keep_output)?;

        Ok(StageResult {
            status: if output.status.success() {
                StageStatus::Success
            } else {
                StageStatus::Failure
            },
            counts,
            raw_artifact_paths,
        })
    }

    fn describe(&self) -> String {
        self.command.join(" ")
    }
}

/// Runs several actions concurrently and joins them into one result.
///
/// No result is read until every invocation has finished. The aggregate
/// fails if any member fails; counts are summed and artifacts concatenated.
/// The first invocation error is returned after the join, carrying the
/// artifacts of every member.
#[derive(Clone, Default)]
pub struct ParallelAction {
    actions: Vec<Arc<dyn StageAction>>,
}

impl ParallelAction {
    pub fn new(actions: Vec<Arc<dyn StageAction>>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl StageAction for ParallelAction {
    async fn invoke(&self, ctx: &StageContext) -> Result<StageResult, ToolInvocationError> {
        let outcomes = join_all(self.actions.iter().map(|a| a.invoke(ctx))).await;

        let mut aggregate = StageResult::success();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(result) => {
                    if !result.is_success() {
                        aggregate.status = StageStatus::Failure;
                    }
                    aggregate.counts = aggregate.counts.merge(result.counts);
                    aggregate.raw_artifact_paths.extend(result.raw_artifact_paths);
                }
                Err(error) => {
                    let (cause, artifacts) = error.into_parts();
                    aggregate.raw_artifact_paths.extend(artifacts);
                    first_error.get_or_insert(cause);
                }
            }
        }
        match first_error {
            Some(cause) => Err(cause.with_artifacts(aggregate.raw_artifact_paths)),
            None => Ok(aggregate),
        }
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.actions.iter().map(|a| a.describe()).collect();
        format!("parallel[{}]", parts.join(", "))
    }
}

/// Returns a fixed result.
#[derive(Debug, Clone)]
pub struct StaticAction {
    result: StageResult,
}

impl StaticAction {
    pub fn new(result: StageResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl StageAction for StaticAction {
    async fn invoke(&self, _ctx: &StageContext) -> Result<StageResult, ToolInvocationError> {
        Ok(self.result.clone())
    }

    fn describe(&self) -> String {
        format!("static({:?})", self.result.status)
    }
}
