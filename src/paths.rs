//! Typed paths into the archive and scratch layouts.
//!
//! Centralizing path construction keeps the orchestrator, harvester, and
//! status reporting agreed on where each artifact lives.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const RESULTS_CSV_NAME: &str = "pressure_ratio.csv";

/// Archive layout under the results root.
///
/// ```text
/// <results_root>/pressure_ratio.csv
/// <results_root>/archive/<run_id>.<ext>
/// <results_root>/runs/<run_id>/{run_config.json,geometry.log,solver.log,outcome.json}
/// ```
#[derive(Debug, Clone)]
pub struct ArchivePaths {
    root: PathBuf,
}

impl ArchivePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the cumulative results CSV path.
    pub fn results_csv_path(&self) -> PathBuf {
        self.root.join(RESULTS_CSV_NAME)
    }

    /// Return the directory holding renamed solver artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    /// Return the archived copy of a scratch artifact for `run_id`.
    ///
    /// The run id becomes the file stem; the scratch file's extension is kept.
    pub fn archived_artifact(&self, run_id: &str, scratch_name: &str) -> PathBuf {
        let file_name = match Path::new(scratch_name).extension() {
            Some(ext) => format!("{run_id}.{}", ext.to_string_lossy()),
            None => run_id.to_string(),
        };
        self.artifacts_dir().join(file_name)
    }

    /// Return the per-run case folder.
    pub fn case_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }

    /// Return the run configuration snapshot path.
    pub fn metadata_path(&self, run_id: &str) -> PathBuf {
        self.case_dir(run_id).join("run_config.json")
    }

    /// Return the geometry tool log path.
    pub fn geometry_log_path(&self, run_id: &str) -> PathBuf {
        self.case_dir(run_id).join("geometry.log")
    }

    /// Return the solver batch log path.
    pub fn solver_log_path(&self, run_id: &str) -> PathBuf {
        self.case_dir(run_id).join("solver.log")
    }

    /// Return the terminal outcome record path.
    pub fn outcome_path(&self, run_id: &str) -> PathBuf {
        self.case_dir(run_id).join("outcome.json")
    }
}

/// Fixed-name artifacts the solver deposits in the shared scratch directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScratchLayout {
    pub dir: PathBuf,
    pub output_file: String,
    pub result_file: String,
    pub report_file: String,
    pub photos_dir: String,
}

impl ScratchLayout {
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(&self.output_file)
    }

    pub fn result_path(&self) -> PathBuf {
        self.dir.join(&self.result_file)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(&self.report_file)
    }

    pub fn photos_path(&self) -> PathBuf {
        self.dir.join(&self.photos_dir)
    }

    /// All four artifact paths, files first.
    pub fn all_paths(&self) -> [PathBuf; 4] {
        [
            self.output_path(),
            self.result_path(),
            self.report_path(),
            self.photos_path(),
        ]
    }

    /// Artifact paths that currently exist.
    pub fn present(&self) -> Vec<PathBuf> {
        self.all_paths()
            .into_iter()
            .filter(|path| path.symlink_metadata().is_ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_artifact_keeps_extension_and_uses_run_id_stem() {
        let paths = ArchivePaths::new(PathBuf::from("/results"));
        assert_eq!(
            paths.archived_artifact("pitch0p00_rpm9000_mdot0p2232", "case_001.res"),
            PathBuf::from("/results/archive/pitch0p00_rpm9000_mdot0p2232.res")
        );
        assert_eq!(
            paths.archived_artifact("id", "report"),
            PathBuf::from("/results/archive/id")
        );
    }

    #[test]
    fn case_files_live_under_runs() {
        let paths = ArchivePaths::new(PathBuf::from("/results"));
        assert_eq!(
            paths.solver_log_path("id"),
            PathBuf::from("/results/runs/id/solver.log")
        );
        assert_eq!(
            paths.metadata_path("id"),
            PathBuf::from("/results/runs/id/run_config.json")
        );
    }
}
