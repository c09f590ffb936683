//! Run parameters and the environment promotion order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::PipelineError;

/// Deployment environment, totally ordered by promotion rank.
///
/// `Dev < Staging < Prod`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// All environments in promotion order.
    pub const ALL: [Environment; 3] = [Environment::Dev, Environment::Staging, Environment::Prod];

    /// Get the environment name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }

    /// Promotion rank (0 = dev).
    pub fn rank(&self) -> u8 {
        match self {
            Environment::Dev => 0,
            Environment::Staging => 1,
            Environment::Prod => 2,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Environment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "staging" | "stage" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(PipelineError::InvalidParameter(format!(
                "unknown environment '{}' (expected dev, staging or prod)",
                other
            ))),
        }
    }
}

/// Boolean switches a stage's entry condition may reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunFlag {
    SecurityScan,
    ComplianceCheck,
}

/// Immutable input to a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunParameters {
    /// Highest environment this run may promote to.
    pub target_env: Environment,

    /// Whether the security scan stage runs.
    pub run_security_scan: bool,

    /// Whether the compliance check stage runs.
    pub run_compliance_check: bool,

    /// Explicit version tag; generated when absent or empty.
    pub version_tag: Option<String>,

    /// Job identifier used in notifications and archive paths.
    pub job_name: String,

    /// Monotonic build number of this run within the job.
    pub build_number: u64,
}

impl RunParameters {
    /// Parameters for `target_env` with every optional stage enabled.
    pub fn new(target_env: Environment) -> Self {
        Self {
            target_env,
            run_security_scan: true,
            run_compliance_check: true,
            version_tag: None,
            job_name: "stagegate".to_string(),
            build_number: 1,
        }
    }

    pub fn with_job(mut self, job_name: impl Into<String>, build_number: u64) -> Self {
        self.job_name = job_name.into();
        self.build_number = build_number;
        self
    }

    pub fn with_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.version_tag = Some(tag.into());
        self
    }

    pub fn with_security_scan(mut self, enabled: bool) -> Self {
        self.run_security_scan = enabled;
        self
    }

    pub fn with_compliance_check(mut self, enabled: bool) -> Self {
        self.run_compliance_check = enabled;
        self
    }

    /// Read a boolean switch.
    pub fn flag(&self, flag: RunFlag) -> bool {
        match flag {
            RunFlag::SecurityScan => self.run_security_scan,
            RunFlag::ComplianceCheck => self.run_compliance_check,
        }
    }

    /// The explicit version tag, or `vYYYY.MM.DD-<build_number>` for `date`.
    pub fn resolved_version_tag(&self, date: NaiveDate) -> String {
        match self.version_tag.as_deref().map(str::trim) {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => format!("v{}-{}", date.format("%Y.%m.%d"), self.build_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_promotion_order() {
        assert!(Environment::Dev < Environment::Staging);
        assert!(Environment::Staging < Environment::Prod);
        assert_eq!(Environment::Prod.rank(), 2);
        assert_eq!(Environment::ALL.iter().max(), Some(&Environment::Prod));
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("STAGING".parse::<Environment>().unwrap(), Environment::Staging);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_serde_lowercase() {
        let json = serde_json::to_string(&Environment::Staging).expect("serialize");
        assert_eq!(json, "\"staging\"");
    }

    #[test]
    fn test_defaults_enable_optional_stages() {
        let params = RunParameters::new(Environment::Dev);
        assert!(params.flag(RunFlag::SecurityScan));
        assert!(params.flag(RunFlag::ComplianceCheck));
        assert!(params.version_tag.is_none());
    }

    #[test]
    fn test_generated_version_tag() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).expect("valid date");
        let params = RunParameters::new(Environment::Prod).with_job("billing", 42);
        assert_eq!(params.resolved_version_tag(date), "v2026.03.07-42");
    }

    #[test]
    fn test_empty_version_tag_is_generated() {
        let date = NaiveDate::from_ymd_opt(2026, 12, 31).expect("valid date");
        let params = RunParameters::new(Environment::Dev)
            .with_job("billing", 9)
            .with_version_tag("  ");
        assert_eq!(params.resolved_version_tag(date), "v2026.12.31-9");
    }

    #[test]
    fn test_explicit_version_tag_wins() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date");
        let params = RunParameters::new(Environment::Dev).with_version_tag("v3.1.0");
        assert_eq!(params.resolved_version_tag(date), "v3.1.0");
    }
}
