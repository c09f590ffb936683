//! Structured output of a stage body.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logical outcome reported by the delegated tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
}

/// Finding counts reported by a verification tool.
///
/// `total` includes the `critical` findings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindingCounts {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub critical: u32,
}

impl FindingCounts {
    pub fn new(total: u32, critical: u32) -> Self {
        Self {
            total: total.max(critical),
            critical,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.total == 0 && self.critical == 0
    }

    /// Combine counts from two invocations of the same stage.
    pub fn merge(self, other: FindingCounts) -> FindingCounts {
        FindingCounts {
            total: self.total.saturating_add(other.total),
            critical: self.critical.saturating_add(other.critical),
        }
    }
}

/// Output of a stage body. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageResult {
    pub status: StageStatus,

    #[serde(default)]
    pub counts: FindingCounts,

    /// Files to archive regardless of the verdict.
    #[serde(default)]
    pub raw_artifact_paths: Vec<PathBuf>,
}

impl StageResult {
    pub fn success() -> Self {
        Self {
            status: StageStatus::Success,
            counts: FindingCounts::default(),
            raw_artifact_paths: Vec::new(),
        }
    }

    pub fn failure() -> Self {
        Self {
            status: StageStatus::Failure,
            ..Self::success()
        }
    }

    pub fn with_counts(mut self, total: u32, critical: u32) -> Self {
        self.counts = FindingCounts::new(total, critical);
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_artifact_paths.push(path.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_total_never_below_critical() {
        let counts = FindingCounts::new(0, 2);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.critical, 2);
    }

    #[test]
    fn test_counts_merge() {
        let merged = FindingCounts::new(3, 1).merge(FindingCounts::new(2, 0));
        assert_eq!(merged, FindingCounts::new(5, 1));
    }

    #[test]
    fn test_result_deserializes_with_defaults() {
        let result: StageResult =
            serde_json::from_str(r#"{"status":"failure"}"#).expect("deserialize");
        assert_eq!(result.status, StageStatus::Failure);
        assert!(result.counts.is_clean());
        assert!(result.raw_artifact_paths.is_empty());
    }

    #[test]
    fn test_builders() {
        let result = StageResult::success()
            .with_counts(3, 1)
            .with_artifact("reports/compliance.json");
        assert!(result.is_success());
        assert_eq!(result.counts.total, 3);
        assert_eq!(result.raw_artifact_paths.len(), 1);
    }
}
