//! Result harvesting from the shared scratch workspace.
//!
//! Harvest order is fixed: verify artifacts, archive copies, extract the
//! metric from the report, append the CSV row, then clear scratch. Cleanup
//! runs last because it destroys the report the metric is read from.
use crate::error::{SweepError, SweepResult};
use crate::paths::{ArchivePaths, ScratchLayout};
use crate::run_config::RunConfig;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const METRIC_MARKER: &str = "Total Pressure Ratio";
pub const CSV_HEADER: &str = "run_id,pressure_ratio";
/// Closes a row left unterminated by a crash so it no longer parses as a record.
const TRUNCATED_ROW_SUFFIX: &str = ",truncated\n";

/// Archived artifact locations and the extracted metric for one run.
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub archived_output: PathBuf,
    pub archived_result: PathBuf,
    pub archived_report: PathBuf,
    pub metric: f64,
}

pub struct Harvester {
    scratch: ScratchLayout,
    archive: ArchivePaths,
    csv: ResultsCsv,
}

impl Harvester {
    pub fn new(scratch: ScratchLayout, archive: ArchivePaths) -> Self {
        let csv = ResultsCsv::new(archive.results_csv_path());
        Self {
            scratch,
            archive,
            csv,
        }
    }

    pub fn csv(&self) -> &ResultsCsv {
        &self.csv
    }

    /// Fail if any scratch artifact is already present.
    pub fn ensure_scratch_clean(&self) -> SweepResult<()> {
        let leftovers = self.scratch.present();
        if leftovers.is_empty() {
            Ok(())
        } else {
            Err(SweepError::ScratchCleanup { leftovers })
        }
    }

    /// Remove every scratch artifact and verify none remain.
    pub fn clear_scratch(&self) -> SweepResult<()> {
        for path in [
            self.scratch.output_path(),
            self.scratch.result_path(),
            self.scratch.report_path(),
        ] {
            remove_if_present(&path, false)?;
        }
        remove_if_present(&self.scratch.photos_path(), true)?;
        self.ensure_scratch_clean()
    }

    /// Archive the scratch artifacts of a finished solver run.
    pub fn harvest(&self, config: &RunConfig) -> SweepResult<HarvestOutcome> {
        let output = self.scratch.output_path();
        let result = self.scratch.result_path();
        let report = self.scratch.report_path();
        for path in [&output, &result, &report] {
            if !path.is_file() {
                return Err(SweepError::MissingArtifact { path: path.clone() });
            }
        }

        let run_id = config.run_id.as_str();
        let archived_output = self
            .archive
            .archived_artifact(run_id, &self.scratch.output_file);
        let archived_result = self
            .archive
            .archived_artifact(run_id, &self.scratch.result_file);
        let archived_report = self
            .archive
            .archived_artifact(run_id, &self.scratch.report_file);
        copy_verified(&output, &archived_output)?;
        copy_verified(&result, &archived_result)?;
        copy_verified(&report, &archived_report)?;

        let bytes = fs::read(&report).map_err(|err| SweepError::archive(&report, err))?;
        let metric = extract_metric(&String::from_utf8_lossy(&bytes)).map_err(|reason| {
            SweepError::MetricParse {
                report: report.clone(),
                reason,
            }
        })?;

        self.csv.append(run_id, metric)?;
        self.clear_scratch()?;
        tracing::info!(run_id, metric, "harvested run");

        Ok(HarvestOutcome {
            archived_output,
            archived_result,
            archived_report,
            metric,
        })
    }
}

/// Pull the first number after the marker phrase on the first marker line.
pub fn extract_metric(report_text: &str) -> Result<f64, String> {
    let line = report_text
        .lines()
        .find(|line| line.contains(METRIC_MARKER))
        .ok_or_else(|| format!("no line contains {METRIC_MARKER:?}"))?;
    let (_, tail) = line.split_once(METRIC_MARKER).unwrap_or((line, ""));
    let token = number_regex()
        .find(tail)
        .ok_or_else(|| format!("no numeric value follows {METRIC_MARKER:?} in {line:?}"))?;
    token
        .as_str()
        .parse::<f64>()
        .map_err(|err| format!("invalid number {:?}: {err}", token.as_str()))
}

fn number_regex() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| {
        Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("regex for metric values")
    })
}

fn copy_verified(source: &Path, dest: &Path) -> SweepResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| SweepError::archive(parent, err))?;
    }
    let copied = fs::copy(source, dest).map_err(|err| SweepError::archive(dest, err))?;
    let written = fs::metadata(dest)
        .map_err(|err| SweepError::archive(dest, err))?
        .len();
    if written != copied {
        return Err(SweepError::archive(
            dest,
            std::io::Error::other(format!("short copy: {written} of {copied} bytes")),
        ));
    }
    tracing::debug!(source = %source.display(), dest = %dest.display(), "archived artifact");
    Ok(())
}

fn remove_if_present(path: &Path, dir: bool) -> SweepResult<()> {
    if path.symlink_metadata().is_err() {
        return Ok(());
    }
    let removed = if dir && path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|_| SweepError::ScratchCleanup {
        leftovers: vec![path.to_path_buf()],
    })
}

/// Append-only CSV of `run_id,pressure_ratio` rows.
#[derive(Debug, Clone)]
pub struct ResultsCsv {
    path: PathBuf,
}

impl ResultsCsv {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with its header, or check the header of an existing file.
    pub fn ensure_header(&self) -> SweepResult<()> {
        if self.path.exists() {
            let text = fs::read_to_string(&self.path)
                .map_err(|err| SweepError::archive(&self.path, err))?;
            let first = text.lines().next().unwrap_or_default();
            if first.trim_end() != CSV_HEADER {
                return Err(SweepError::configuration(format!(
                    "{} does not start with header {CSV_HEADER:?}",
                    self.path.display()
                )));
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| SweepError::archive(parent, err))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|err| SweepError::archive(&self.path, err))?;
        file.write_all(format!("{CSV_HEADER}\n").as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| SweepError::archive(&self.path, err))?;
        Ok(())
    }

    /// Append one row and force it to stable storage.
    pub fn append(&self, run_id: &str, metric: f64) -> SweepResult<()> {
        self.ensure_header()?;
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| SweepError::archive(&self.path, err))?;

        let mut row = String::new();
        if !ends_with_newline(&mut file).map_err(|err| SweepError::archive(&self.path, err))? {
            tracing::warn!(path = %self.path.display(), "results CSV ended mid-row; marking it truncated");
            row.push_str(TRUNCATED_ROW_SUFFIX);
        }
        row.push_str(&format!("{run_id},{metric}\n"));
        file.write_all(row.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| SweepError::archive(&self.path, err))?;
        Ok(())
    }

    /// Parsed data rows. Malformed lines and an unterminated final line are skipped.
    pub fn records(&self) -> SweepResult<Vec<(String, f64)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text =
            fs::read_to_string(&self.path).map_err(|err| SweepError::archive(&self.path, err))?;
        let complete = match text.rfind('\n') {
            Some(end) => &text[..=end],
            None => "",
        };
        let records = complete
            .lines()
            .skip(1)
            .filter_map(|line| {
                let (run_id, value) = line.split_once(',')?;
                let metric = value.trim().parse::<f64>().ok()?;
                (!run_id.is_empty()).then(|| (run_id.to_string(), metric))
            })
            .collect();
        Ok(records)
    }

    pub fn recorded_run_ids(&self) -> SweepResult<BTreeSet<String>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|(run_id, _)| run_id)
            .collect())
    }
}

fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
