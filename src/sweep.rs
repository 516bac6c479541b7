//! Sequential case pipeline for a sweep.
//!
//! Each configuration moves through
//! `Pending -> GeometryDone -> TemplateRendered -> Solved -> Harvested`,
//! or stops in `Failed`. The first failure halts the sweep: the scratch
//! workspace and rendered input are shared, so later cases cannot trust them.
use crate::config::SweepConfig;
use crate::error::{SweepError, SweepResult};
use crate::harvest::{HarvestOutcome, Harvester};
use crate::invoke::{invoke, ExecutionResult};
use crate::paths::ArchivePaths;
use crate::run_config::RunConfig;
use crate::template;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const OUTCOME_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    GeometryDone,
    TemplateRendered,
    Solved,
    Harvested,
    Failed,
}

impl std::fmt::Display for CaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::GeometryDone => "geometry_done",
            Self::TemplateRendered => "template_rendered",
            Self::Solved => "solved",
            Self::Harvested => "harvested",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Selection knobs for one sweep execution.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip run_ids already recorded in the results CSV.
    pub resume: bool,
    /// Restrict the sweep to these run_ids (all when empty).
    pub only: Vec<String>,
    /// Clear scratch artifacts once before the first case.
    pub purge_scratch: bool,
}

#[derive(Debug, Clone)]
pub struct CaseRecord {
    pub run_id: String,
    pub harvest: HarvestOutcome,
}

#[derive(Debug)]
pub struct CaseFailure {
    pub run_id: String,
    /// Last state reached before the failure.
    pub reached: CaseState,
    pub error: SweepError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub planned: usize,
    pub completed: Vec<CaseRecord>,
    pub skipped: Vec<String>,
    pub failure: Option<CaseFailure>,
}

impl SweepReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Serialize)]
struct CaseOutcome<'a> {
    schema_version: u32,
    run_id: &'a str,
    state: CaseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    reached: Option<CaseState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    finished_at: String,
}

/// Drives configurations through geometry, rendering, solve, and harvest.
pub struct Pipeline {
    config: SweepConfig,
    archive: ArchivePaths,
    harvester: Harvester,
}

impl Pipeline {
    pub fn new(config: SweepConfig) -> Self {
        let archive = config.archive_paths();
        let harvester = Harvester::new(config.scratch.clone(), archive.clone());
        Self {
            config,
            archive,
            harvester,
        }
    }

    pub fn archive(&self) -> &ArchivePaths {
        &self.archive
    }

    /// Apply `only`/`resume` filters, returning the cases to run and the skipped ids.
    ///
    /// Already-harvested run_ids are never re-run; without `resume` their
    /// presence is an error so archive entries are not silently rewritten.
    pub fn select(
        &self,
        configs: Vec<RunConfig>,
        options: &RunOptions,
    ) -> SweepResult<(Vec<RunConfig>, Vec<String>)> {
        let known: BTreeSet<&str> = configs.iter().map(|c| c.run_id.as_str()).collect();
        if let Some(unknown) = options.only.iter().find(|id| !known.contains(id.as_str())) {
            return Err(SweepError::configuration(format!(
                "--only {unknown} does not name a run in this sweep"
            )));
        }
        let recorded = self.harvester.csv().recorded_run_ids()?;
        let mut selected = Vec::new();
        let mut skipped = Vec::new();
        for config in configs {
            if !options.only.is_empty() && !options.only.contains(&config.run_id) {
                continue;
            }
            if recorded.contains(&config.run_id) {
                if !options.resume {
                    return Err(SweepError::configuration(format!(
                        "{} is already recorded in {}; use --resume to skip harvested runs",
                        config.run_id,
                        self.harvester.csv().path().display()
                    )));
                }
                skipped.push(config.run_id);
                continue;
            }
            selected.push(config);
        }
        Ok((selected, skipped))
    }

    /// Run the sweep one case at a time, halting on the first failure.
    pub fn run(&self, configs: Vec<RunConfig>, options: &RunOptions) -> SweepResult<SweepReport> {
        let (selected, skipped) = self.select(configs, options)?;
        fs::create_dir_all(self.archive.root())
            .map_err(|err| SweepError::archive(self.archive.root(), err))?;
        self.harvester.csv().ensure_header()?;
        if options.purge_scratch {
            tracing::warn!(dir = %self.config.scratch.dir.display(), "purging scratch workspace");
            self.harvester.clear_scratch()?;
        }

        for run_id in &skipped {
            println!("skip {run_id} (already harvested)");
        }
        let mut report = SweepReport {
            planned: selected.len(),
            skipped,
            ..SweepReport::default()
        };

        let total = selected.len();
        for (idx, config) in selected.iter().enumerate() {
            println!("[{}/{}] Running {}", idx + 1, total, config.run_id);
            let mut state = CaseState::Pending;
            let result = self
                .run_case(config, &mut state)
                .and_then(|harvest| {
                    self.write_outcome(config, CaseState::Harvested, None, Some(&harvest))?;
                    Ok(harvest)
                });
            match result {
                Ok(harvest) => {
                    println!("  pressure ratio {}", harvest.metric);
                    report.completed.push(CaseRecord {
                        run_id: config.run_id.clone(),
                        harvest,
                    });
                }
                Err(error) => {
                    println!("  ERROR: {error}");
                    tracing::error!(run_id = %config.run_id, reached = %state, "case failed; halting sweep");
                    if let Err(outcome_err) =
                        self.write_outcome(config, CaseState::Failed, Some((state, &error)), None)
                    {
                        tracing::warn!(error = %outcome_err, "could not record case outcome");
                    }
                    report.failure = Some(CaseFailure {
                        run_id: config.run_id.clone(),
                        reached: state,
                        error,
                    });
                    break;
                }
            }
        }
        Ok(report)
    }

    fn run_case(&self, config: &RunConfig, state: &mut CaseState) -> SweepResult<HarvestOutcome> {
        let run_id = config.run_id.as_str();
        self.harvester.ensure_scratch_clean()?;
        self.write_metadata(config)?;

        let geometry_log = self.archive.geometry_log_path(run_id);
        let geometry = self.config.geometry.invocation("geometry", config);
        require_success(&invoke(&geometry, &geometry_log)?, "geometry", &geometry_log)?;
        *state = CaseState::GeometryDone;
        tracing::info!(run_id, state = %state, "geometry regenerated");

        template::render(
            &self.config.template.path,
            &self.config.template.rendered_path,
            config,
        )?;
        *state = CaseState::TemplateRendered;
        tracing::info!(run_id, state = %state, "solver input staged");

        let solver_log = self.archive.solver_log_path(run_id);
        let solver = self.config.solver.invocation("solver", config);
        require_success(&invoke(&solver, &solver_log)?, "solver", &solver_log)?;
        *state = CaseState::Solved;
        tracing::info!(run_id, state = %state, "solver finished");

        let harvest = self.harvester.harvest(config)?;
        *state = CaseState::Harvested;
        Ok(harvest)
    }

    fn write_metadata(&self, config: &RunConfig) -> SweepResult<()> {
        let path = self.archive.metadata_path(&config.run_id);
        write_json(&path, config)
    }

    fn write_outcome(
        &self,
        config: &RunConfig,
        state: CaseState,
        failure: Option<(CaseState, &SweepError)>,
        harvest: Option<&HarvestOutcome>,
    ) -> SweepResult<()> {
        let outcome = CaseOutcome {
            schema_version: OUTCOME_SCHEMA_VERSION,
            run_id: &config.run_id,
            state,
            reached: failure.map(|(reached, _)| reached),
            pressure_ratio: harvest.map(|h| h.metric),
            error_kind: failure.map(|(_, err)| err.kind()),
            error: failure.map(|(_, err)| err.to_string()),
            finished_at: jiff::Timestamp::now().to_string(),
        };
        write_json(&self.archive.outcome_path(&config.run_id), &outcome)
    }
}

fn require_success(result: &ExecutionResult, tool: &str, log: &Path) -> SweepResult<()> {
    if result.success() {
        return Ok(());
    }
    Err(SweepError::ExternalToolFailure {
        tool: tool.to_string(),
        reason: result.failure_reason(),
        log: log.to_path_buf(),
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> SweepResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| SweepError::archive(parent, err))?;
    }
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| SweepError::archive(path, std::io::Error::other(err)))?;
    fs::write(path, text.as_bytes()).map_err(|err| SweepError::archive(path, err))?;
    Ok(())
}
