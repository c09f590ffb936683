//! Stage descriptors for the fixed promotion sequence.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::params::Environment;
use crate::action::StageAction;
use crate::condition::EntryCondition;

/// The stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Lint and configuration validation.
    Validate,
    UnitTest,
    IntegrationTest,
    /// Optional, controlled by `run_compliance_check`.
    ComplianceCheck,
    /// Optional, controlled by `run_security_scan`.
    SecurityScan,
    BuildPackage,
    DeployDev,
    /// Gated promotion.
    DeployStaging,
    /// Gated promotion.
    DeployProd,
}

impl StageKind {
    /// The fixed execution order.
    pub const SEQUENCE: [StageKind; 9] = [
        StageKind::Validate,
        StageKind::UnitTest,
        StageKind::IntegrationTest,
        StageKind::ComplianceCheck,
        StageKind::SecurityScan,
        StageKind::BuildPackage,
        StageKind::DeployDev,
        StageKind::DeployStaging,
        StageKind::DeployProd,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Validate => "validate",
            StageKind::UnitTest => "unit_test",
            StageKind::IntegrationTest => "integration_test",
            StageKind::ComplianceCheck => "compliance_check",
            StageKind::SecurityScan => "security_scan",
            StageKind::BuildPackage => "build_package",
            StageKind::DeployDev => "deploy_dev",
            StageKind::DeployStaging => "deploy_staging",
            StageKind::DeployProd => "deploy_prod",
        }
    }

    /// Environment a deploy stage promotes into.
    pub fn promotion_env(&self) -> Option<Environment> {
        match self {
            StageKind::DeployDev => Some(Environment::Dev),
            StageKind::DeployStaging => Some(Environment::Staging),
            StageKind::DeployProd => Some(Environment::Prod),
            _ => None,
        }
    }

    /// Whether the stage's deploy action waits on an approval gate.
    pub fn is_gated(&self) -> bool {
        matches!(self, StageKind::DeployStaging | StageKind::DeployProd)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a `failure` status means for the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FatalOnError,
    WarnOnError,
}

/// Static descriptor of one stage.
#[derive(Clone)]
pub struct StageDefinition {
    pub kind: StageKind,
    pub condition: EntryCondition,
    pub body: Arc<dyn StageAction>,
    /// Post-deploy verification, classified separately from the body.
    pub smoke_test: Option<Arc<dyn StageAction>>,
    pub gated: bool,
    pub approval_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
}

impl StageDefinition {
    pub fn new(kind: StageKind, condition: EntryCondition, body: Arc<dyn StageAction>) -> Self {
        Self {
            kind,
            condition,
            body,
            smoke_test: None,
            gated: false,
            approval_timeout: None,
            failure_policy: FailurePolicy::FatalOnError,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn with_smoke_test(mut self, smoke_test: Option<Arc<dyn StageAction>>) -> Self {
        self.smoke_test = smoke_test;
        self
    }

    pub fn gated(mut self, timeout: Duration) -> Self {
        self.gated = true;
        self.approval_timeout = Some(timeout);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("kind", &self.kind)
            .field("condition", &self.condition)
            .field("body", &self.body.describe())
            .field("smoke_test", &self.smoke_test.as_ref().map(|s| s.describe()))
            .field("gated", &self.gated)
            .field("approval_timeout", &self.approval_timeout)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}
