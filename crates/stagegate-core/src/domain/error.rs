//! Error taxonomy for the stage orchestration engine.

use std::path::PathBuf;

/// Raised when a stage's delegated tool cannot be invoked at all.
///
/// This is distinct from a tool that ran and reported a logical failure
/// through `StageResult::status`; an invocation error is always fatal and
/// bypasses classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolInvocationError {
    #[error("stage {stage} has an empty command")]
    EmptyCommand { stage: String },

    #[error("failed to spawn `{program}` for stage {stage}: {message}")]
    Spawn {
        stage: String,
        program: String,
        message: String,
    },

    #[error("stage {stage} timed out after {timeout_secs} seconds")]
    Timeout { stage: String, timeout_secs: u64 },

    #[error("unreadable result file {path:?} for stage {stage}: {message}")]
    ResultFile {
        stage: String,
        path: PathBuf,
        message: String,
    },

    #[error("tool for stage {stage} is unavailable: {message}")]
    Unavailable { stage: String, message: String },

    /// The tool ran far enough to leave raw output behind before failing.
    #[error("{error}")]
    WithArtifacts {
        error: Box<ToolInvocationError>,
        artifacts: Vec<PathBuf>,
    },
}

impl ToolInvocationError {
    /// Attach raw output paths that should still be archived.
    pub fn with_artifacts(self, artifacts: Vec<PathBuf>) -> Self {
        let (error, mut existing) = self.into_parts();
        existing.extend(artifacts);
        if existing.is_empty() {
            return error;
        }
        ToolInvocationError::WithArtifacts {
            error: Box::new(error),
            artifacts: existing,
        }
    }

    /// Raw output paths left behind by the failed invocation.
    pub fn artifacts(&self) -> &[PathBuf] {
        match self {
            ToolInvocationError::WithArtifacts { artifacts, .. } => artifacts,
            _ => &[],
        }
    }

    /// Split into the underlying cause and its artifact paths.
    pub fn into_parts(self) -> (ToolInvocationError, Vec<PathBuf>) {
        match self {
            ToolInvocationError::WithArtifacts { error, artifacts } => {
                let (error, mut inner) = error.into_parts();
                inner.extend(artifacts);
                (error, inner)
            }
            other => (other, Vec::new()),
        }
    }
}

/// Pipeline-level errors (configuration, persistence, transport).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid run parameter: {0}")]
    InvalidParameter(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
