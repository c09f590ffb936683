//! Pipeline configuration.
//!
//! Loaded from a JSON file; every field has a default so an empty object is
//! a valid configuration. Approval timeouts live here rather than in code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::action::{CommandAction, StageAction};
use crate::domain::{Environment, PipelineError, Result, StageKind};
use crate::engine::{DeployActions, StageActions};

/// Default staging approval window (1 hour).
pub const DEFAULT_STAGING_APPROVAL_SECS: u64 = 60 * 60;

/// Default production approval window (24 hours).
pub const DEFAULT_PROD_APPROVAL_SECS: u64 = 24 * 60 * 60;

/// Default per-command timeout (30 minutes).
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30 * 60;

/// Approval windows per gated environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApprovalTimeouts {
    pub staging_secs: u64,
    pub prod_secs: u64,
}

impl Default for ApprovalTimeouts {
    fn default() -> Self {
        Self {
            staging_secs: DEFAULT_STAGING_APPROVAL_SECS,
            prod_secs: DEFAULT_PROD_APPROVAL_SECS,
        }
    }
}

/// One external command backing a stage body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandSpec {
    /// Command to execute (first element is executable).
    pub command: Vec<String>,
    /// JSON file the tool writes with `{"total": n, "critical": m}`.
    pub result_file: Option<PathBuf>,
    /// Extra files to archive.
    pub artifacts: Vec<PathBuf>,
    /// Overrides `PipelineConfig::command_timeout_secs`.
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    pub fn new(command: &[&str]) -> Self {
        Self {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// No command configured; invoking it is an `EmptyCommand` error.
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    fn to_action(&self, default_timeout: u64, working_dir: Option<&Path>) -> CommandAction {
        let mut action =
            CommandAction::new(self.command.clone(), self.timeout_secs.unwrap_or(default_timeout))
                .with_artifacts(self.artifacts.clone());
        if let Some(file) = &self.result_file {
            action = action.with_result_file(file);
        }
        if let Some(dir) = working_dir {
            action = action.with_working_dir(dir);
        }
        action
    }
}

/// Deploy command plus its optional post-deploy smoke test.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployCommandSpec {
    pub deploy: CommandSpec,
    pub smoke_test: Option<CommandSpec>,
}

impl DeployCommandSpec {
    fn is_empty(&self) -> bool {
        self.deploy.is_empty() || self.smoke_test.as_ref().is_some_and(CommandSpec::is_empty)
    }
}

/// Commands for every stage of the fixed sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StageCommands {
    pub validate: CommandSpec,
    pub unit_test: CommandSpec,
    /// Subsystem suites run concurrently and are joined into one result.
    pub integration_test: Vec<CommandSpec>,
    pub compliance_check: CommandSpec,
    pub security_scan: CommandSpec,
    pub build_package: CommandSpec,
    pub deploy_dev: DeployCommandSpec,
    pub deploy_staging: DeployCommandSpec,
    pub deploy_prod: DeployCommandSpec,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub approval: ApprovalTimeouts,
    pub command_timeout_secs: u64,
    /// Working directory for every command (default: process cwd).
    pub workspace: Option<PathBuf>,
    /// Root directory for archived artifacts and reports.
    pub archive_dir: Option<PathBuf>,
    /// Base URL for run links, e.g. `https://ci.example.com/job`.
    pub run_url_base: Option<String>,
    /// Webhook receiving notification intents.
    pub notify_webhook: Option<String>,
    pub stages: StageCommands,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            approval: ApprovalTimeouts::default(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            workspace: None,
            archive_dir: None,
            run_url_base: None,
            notify_webhook: None,
            stages: StageCommands::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {:?}: {}", path, e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.approval.staging_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "approval.staging_secs must be greater than zero".to_string(),
            ));
        }
        if self.approval.prod_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "approval.prod_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(base) = &self.run_url_base {
            if base.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "run_url_base must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Approval window for a gated environment; `None` for dev.
    pub fn approval_timeout(&self, env: Environment) -> Option<Duration> {
        match env {
            Environment::Dev => None,
            Environment::Staging => Some(Duration::from_secs(self.approval.staging_secs)),
            Environment::Prod => Some(Duration::from_secs(self.approval.prod_secs)),
        }
    }

    /// Link to a run, when a base URL is configured.
    pub fn run_url(&self, job_name: &str, build_number: u64) -> Option<String> {
        self.run_url_base
            .as_ref()
            .map(|base| format!("{}/{}/{}", base.trim_end_matches('/'), job_name, build_number))
    }

    /// Stages that would abort with `EmptyCommand` if reached.
    ///
    /// The built-in default configures no commands at all, so every stage is
    /// listed until a configuration file supplies them.
    pub fn unconfigured_stages(&self) -> Vec<StageKind> {
        let s = &self.stages;
        let integration_empty =
            s.integration_test.is_empty() || s.integration_test.iter().any(CommandSpec::is_empty);
        [
            (StageKind::Validate, s.validate.is_empty()),
            (StageKind::UnitTest, s.unit_test.is_empty()),
            (StageKind::IntegrationTest, integration_empty),
            (StageKind::ComplianceCheck, s.compliance_check.is_empty()),
            (StageKind::SecurityScan, s.security_scan.is_empty()),
            (StageKind::BuildPackage, s.build_package.is_empty()),
            (StageKind::DeployDev, s.deploy_dev.is_empty()),
            (StageKind::DeployStaging, s.deploy_staging.is_empty()),
            (StageKind::DeployProd, s.deploy_prod.is_empty()),
        ]
        .into_iter()
        .filter_map(|(stage, empty)| empty.then_some(stage))
        .collect()
    }

    /// Build command-backed stage bodies from `stages`.
    pub fn stage_actions(&self) -> StageActions {
        let dir = self.workspace.as_deref();
        let timeout = self.command_timeout_secs;
        let cmd = |spec: &CommandSpec| -> Arc<dyn StageAction> {
            Arc::new(spec.to_action(timeout, dir))
        };
        let deploy = |spec: &DeployCommandSpec| DeployActions {
            deploy: cmd(&spec.deploy),
            smoke_test: spec.smoke_test.as_ref().map(cmd),
        };

        let integration_test: Arc<dyn StageAction> = match self.stages.integration_test.as_slice() {
            [] => cmd(&CommandSpec::default()),
            [single] => cmd(single),
            suites => Arc::new(crate::action::ParallelAction::new(
                suites.iter().map(cmd).collect(),
            )),
        };

        StageActions {
            validate: cmd(&self.stages.validate),
            unit_test: cmd(&self.stages.unit_test),
            integration_test,
            compliance_check: cmd(&self.stages.compliance_check),
            security_scan: cmd(&self.stages.security_scan),
            build_package: cmd(&self.stages.build_package),
            deploy_dev: deploy(&self.stages.deploy_dev),
            deploy_staging: deploy(&self.stages.deploy_staging),
            deploy_prod: deploy(&self.stages.deploy_prod),
        }
    }
}
