//! Guaranteed post-run archival of raw stage artifacts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{PipelineError, RecordedArtifact, Result, StageKind};

/// Where a run's artifacts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    pub run_id: Uuid,
    pub job_name: String,
    pub build_number: u64,
}

/// What happened to one recorded artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveStatus {
    Archived {
        destination: PathBuf,
        sha256: String,
        bytes: u64,
    },
    /// The stage declared the file but never wrote it.
    Missing,
    /// The file exists but could not be copied; other artifacts still are.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchivedArtifact {
    pub stage: StageKind,
    pub source: PathBuf,
    #[serde(flatten)]
    pub status: ArchiveStatus,
}

/// Persists a run's recorded artifacts.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(
        &self,
        target: &ArchiveTarget,
        artifacts: &[RecordedArtifact],
    ) -> Result<Vec<ArchivedArtifact>>;
}

/// Copies artifacts under `<root>/<job_name>/<build_number>/<stage>/`.
///
/// Artifacts of one stage that share a file name are stored as `2-name`,
/// `3-name` and so on, in recording order.
#[derive(Debug, Clone)]
pub struct FsArchiver {
    root: PathBuf,
}

impl FsArchiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one run's archive.
    pub fn run_dir(&self, target: &ArchiveTarget) -> PathBuf {
        self.root
            .join(sanitize(&target.job_name))
            .join(target.build_number.to_string())
    }

    async fn archive_one(
        &self,
        run_dir: &Path,
        artifact: &RecordedArtifact,
        taken: &mut HashSet<PathBuf>,
    ) -> Result<ArchiveStatus> {
        let content = match tokio::fs::read(&artifact.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ArchiveStatus::Missing),
            Err(e) => return Err(e.into()),
        };

        let file_name = artifact
            .path
            .file_name()
            .ok_or_else(|| {
                PipelineError::Archive(format!(
                    "artifact path has no file name: {:?}",
                    artifact.path
                ))
            })?
            .to_string_lossy()
            .into_owned();
        let stage_dir = run_dir.join(artifact.stage.name());
        tokio::fs::create_dir_all(&stage_dir).await?;
        let destination = unique_destination(&stage_dir, &file_name, taken);
        tokio::fs::write(&destination, &content).await?;

        Ok(ArchiveStatus::Archived {
            destination,
            sha256: hex::encode(Sha256::digest(&content)),
            bytes: content.len() as u64,
        })
    }
}

/// First unused `<dir>/<name>`, `<dir>/2-<name>`, ... for this run.
fn unique_destination(dir: &Path, file_name: &str, taken: &mut HashSet<PathBuf>) -> PathBuf {
    let mut candidate = dir.join(file_name);
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = dir.join(format!("{}-{}", n, file_name));
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[async_trait]
impl Archiver for FsArchiver {
    async fn archive(
        &self,
        target: &ArchiveTarget,
        artifacts: &[RecordedArtifact],
    ) -> Result<Vec<ArchivedArtifact>> {
        let run_dir = self.run_dir(target);
        tokio::fs::create_dir_all(&run_dir).await?;

        let mut taken = HashSet::new();
        let mut archived = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let status = match self.archive_one(&run_dir, artifact, &mut taken).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        stage = %artifact.stage,
                        path = ?artifact.path,
                        error = %e,
                        "artifact not archived"
                    );
                    ArchiveStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            archived.push(ArchivedArtifact {
                stage: artifact.stage,
                source: artifact.path.clone(),
                status,
            });
        }
        Ok(archived)
    }
}

/// Keep job names usable as a single path component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        s => s.to_string(),
    }
}
