//! Error taxonomy for the sweep pipeline.
//!
//! Every variant is fatal to the configuration being processed; the
//! orchestrator halts the sweep on the first one it sees.
use std::path::PathBuf;

pub type SweepResult<T> = Result<T, SweepError>;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Bad parameter arrays or an unusable sweep configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("template I/O error on {}: {source}", path.display())]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit, timeout, or spawn failure of an external tool.
    #[error("{tool} failed ({reason}); see log {}", log.display())]
    ExternalToolFailure {
        tool: String,
        reason: String,
        log: PathBuf,
    },

    /// The solver exited cleanly but left no usable output behind.
    #[error("solver artifact missing from scratch workspace: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("scratch workspace not clean, leftover entries: {}", display_paths(leftovers))]
    ScratchCleanup { leftovers: Vec<PathBuf> },

    #[error("could not extract metric from {}: {reason}", report.display())]
    MetricParse { report: PathBuf, reason: String },

    /// I/O failure while writing archive entries, the results CSV, or logs.
    #[error("archive I/O error on {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SweepError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable kind used in `outcome.json`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::TemplateIo { .. } => "template_io",
            Self::ExternalToolFailure { .. } => "external_tool_failure",
            Self::MissingArtifact { .. } => "missing_artifact",
            Self::ScratchCleanup { .. } => "scratch_cleanup",
            Self::MetricParse { .. } => "metric_parse",
            Self::Archive { .. } => "archive_io",
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
