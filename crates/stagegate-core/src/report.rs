//! Final run report and its persisted forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::approval::{ApprovalRequest, ApprovalResolution};
use crate::archive::{ArchiveStatus, ArchivedArtifact};
use crate::domain::{
    RecordedArtifact, Result, RunParameters, RunStatus, StageKind, StageOutcome, StageRecord,
    Verdict,
};
use crate::notify::NotificationIntent;

/// One approval request and how it resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalRecord {
    pub request: ApprovalRequest,
    pub resolution: ApprovalResolution,
}

/// Summary of a finished run; what remains of `RunState` after finalize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub params: RunParameters,
    pub version_tag: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Stages reached, in order. Stages never reached are absent.
    pub stages: Vec<StageRecord>,
    pub abort_reason: Option<String>,
    pub findings: Vec<String>,
    /// Every raw artifact a stage reported, archived or not.
    pub artifacts: Vec<RecordedArtifact>,
    pub archived: Vec<ArchivedArtifact>,
    pub approvals: Vec<ApprovalRecord>,
    pub notification: Option<NotificationIntent>,
    pub run_url: Option<String>,
    /// Archival or notification failures; they never change `status`.
    pub post_run_errors: Vec<String>,
}

impl RunReport {
    pub fn record(&self, stage: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Whether the stage's body (deploy action for promotions) was invoked.
    pub fn body_ran(&self, stage: StageKind) -> bool {
        self.record(stage).is_some_and(StageRecord::body_ran)
    }

    pub fn was_skipped(&self, stage: StageKind) -> bool {
        self.record(stage).is_some_and(StageRecord::is_skipped)
    }

    pub fn was_reached(&self, stage: StageKind) -> bool {
        self.record(stage).is_some()
    }

    pub fn verdict(&self, stage: StageKind) -> Option<&Verdict> {
        self.record(stage).and_then(|r| r.verdict.as_ref())
    }
}

/// Write `run_report.json` in pretty JSON format.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Render a markdown summary of a run.
pub fn render_report_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# {} #{}: {}\n\n",
        report.params.job_name,
        report.params.build_number,
        report.status.name().to_uppercase()
    ));
    out.push_str(&format!(
        "- run: `{}`\n- target: {}\n- version: {}\n- duration: {}ms\n",
        report.run_id, report.params.target_env, report.version_tag, report.duration_ms
    ));
    if let Some(url) = &report.run_url {
        out.push_str(&format!("- link: {}\n", url));
    }
    out.push('\n');

    if let Some(reason) = &report.abort_reason {
        out.push_str(&format!("**Aborted:** {}\n\n", reason));
    }

    out.push_str("## Stages\n");
    for record in &report.stages {
        let mark = match (&record.outcome, &record.verdict) {
            (StageOutcome::Skipped, _) => "skipped".to_string(),
            (StageOutcome::NotApproved, _) => "not approved".to_string(),
            (_, Some(Verdict::Continue)) => "ok".to_string(),
            (_, Some(Verdict::Warn { finding })) => format!("warn: {}", finding),
            (_, Some(Verdict::Abort { reason })) => format!("abort: {}", reason),
            (_, None) => "unknown".to_string(),
        };
        out.push_str(&format!("- `{}` {}\n", record.stage, mark));
    }
    out.push('\n');

    if !report.findings.is_empty() {
        out.push_str("## Findings\n");
        for finding in &report.findings {
            out.push_str(&format!("- {}\n", finding));
        }
        out.push('\n');
    }

    if !report.archived.is_empty() {
        out.push_str("## Artifacts\n");
        for artifact in &report.archived {
            match &artifact.status {
                ArchiveStatus::Archived { sha256, .. } => out.push_str(&format!(
                    "- `{}` ({}) sha256:{}\n",
                    artifact.source.display(),
                    artifact.stage,
                    &sha256[..12.min(sha256.len())]
                )),
                ArchiveStatus::Missing => out.push_str(&format!(
                    "- `{}` ({}) missing\n",
                    artifact.source.display(),
                    artifact.stage
                )),
                ArchiveStatus::Failed { error } => out.push_str(&format!(
                    "- `{}` ({}) not archived: {}\n",
                    artifact.source.display(),
                    artifact.stage,
                    error
                )),
            }
        }
        out.push('\n');
    }

    if !report.post_run_errors.is_empty() {
        out.push_str("## Post-run errors\n");
        for error in &report.post_run_errors {
            out.push_str(&format!("- {}\n", error));
        }
    }
    out
}

/// Write the markdown summary.
pub fn write_report_md(path: &Path, report: &RunReport) -> Result<()> {
    std::fs::write(path, render_report_md(report))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Environment, StageResult, StepOutcome};
    use std::path::PathBuf;

    fn sample() -> RunReport {
        let ts = DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        RunReport {
            run_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("valid UUID"),
            params: RunParameters::new(Environment::Staging).with_job("billing", 3),
            version_tag: "v2026.10.19-3".to_string(),
            status: RunStatus::Failure,
            started_at: ts,
            finished_at: ts,
            duration_ms: 42,
            stages: vec![
                StageRecord {
                    stage: StageKind::Validate,
                    outcome: StageOutcome::Ran {
                        body: StepOutcome::Classified {
                            result: StageResult::success().with_counts(2, 0),
                            verdict: Verdict::warn("validate reported 2 non-critical finding(s)"),
                        },
                        smoke_test: None,
                    },
                    verdict: Some(Verdict::warn("validate reported 2 non-critical finding(s)")),
                    approval: None,
                },
                StageRecord::skipped(StageKind::SecurityScan),
                StageRecord {
                    stage: StageKind::BuildPackage,
                    outcome: StageOutcome::Ran {
                        body: StepOutcome::InvocationFailed {
                            error: "spawn failed".to_string(),
                            verdict: Verdict::abort("build_package could not be invoked"),
                        },
                        smoke_test: None,
                    },
                    verdict: Some(Verdict::abort("build_package could not be invoked")),
                    approval: None,
                },
            ],
            abort_reason: Some("build_package could not be invoked".to_string()),
            findings: vec!["validate reported 2 non-critical finding(s)".to_string()],
            artifacts: vec![RecordedArtifact {
                stage: StageKind::Validate,
                path: PathBuf::from("lint.json"),
            }],
            archived: vec![
                ArchivedArtifact {
                    stage: StageKind::Validate,
                    source: PathBuf::from("lint.json"),
                    status: ArchiveStatus::Missing,
                },
                ArchivedArtifact {
                    stage: StageKind::BuildPackage,
                    source: PathBuf::from("dist"),
                    status: ArchiveStatus::Failed {
                        error: "io error: Is a directory (os error 21)".to_string(),
                    },
                },
            ],
            approvals: vec![],
            notification: None,
            run_url: None,
            post_run_errors: vec![],
        }
    }

    #[test]
    fn test_report_queries() {
        let report = sample();
        assert!(report.body_ran(StageKind::Validate));
        assert!(report.was_skipped(StageKind::SecurityScan));
        assert!(!report.body_ran(StageKind::SecurityScan));
        assert!(!report.was_reached(StageKind::DeployDev));
        assert!(report.verdict(StageKind::BuildPackage).is_some_and(Verdict::is_abort));
    }

    #[test]
    fn test_report_json_has_expected_keys() {
        let raw = serde_json::to_value(sample()).expect("serialize report");
        let obj = raw.as_object().expect("report object");
        for key in ["run_id", "params", "version_tag", "status", "stages", "artifacts"] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert_eq!(raw["status"], "failure");
        assert_eq!(raw["stages"][1]["outcome"]["kind"], "skipped");
        assert_eq!(raw["archived"][0]["status"], "missing");
        assert_eq!(raw["archived"][1]["status"], "failed");
        assert_eq!(
            raw["archived"][1]["error"],
            "io error: Is a directory (os error 21)"
        );
    }

    #[test]
    fn test_markdown_lists_stages_and_findings() {
        let md = render_report_md(&sample());
        assert!(md.contains("# billing #3: FAILURE"));
        assert!(md.contains("**Aborted:** build_package could not be invoked"));
        assert!(md.contains("- `security_scan` skipped"));
        assert!(md.contains("## Findings"));
        assert!(md.contains("`lint.json` (validate) missing"));
        assert!(md.contains("`dist` (build_package) not archived: io error"));
    }

    #[test]
    fn test_write_json_roundtrip_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run_report.json");
        let report = sample();
        write_report_json(&path, &report).expect("write");
        let back: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(back, report);
    }
}
