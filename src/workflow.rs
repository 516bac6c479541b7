//! Command implementations behind the CLI.
use crate::cli::{InitArgs, PlanArgs, RunArgs, StatusArgs};
use crate::config::{self, SweepConfig};
use crate::harvest::ResultsCsv;
use crate::run_config::RunConfig;
use crate::sweep::{Pipeline, RunOptions};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub fn run_init(args: InitArgs) -> Result<()> {
    if args.config.exists() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            args.config.display()
        ));
    }
    let stub = config::config_stub()?;
    if let Some(parent) = args.config.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&args.config, stub.as_bytes())
        .with_context(|| format!("write {}", args.config.display()))?;
    println!("wrote {}", args.config.display());
    Ok(())
}

#[derive(Serialize)]
struct PlanSummary<'a> {
    total: usize,
    runs: &'a [RunConfig],
}

pub fn run_plan(args: PlanArgs) -> Result<()> {
    let (config, runs) = load_sweep(&args.config)?;
    config::check_tools(&config)?;
    if args.json {
        let summary = PlanSummary {
            total: runs.len(),
            runs: &runs,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    for run in &runs {
        println!(
            "{}  pitch_deg={} rpm={} mass_flow={}",
            run.run_id, run.pitch_deg, run.rpm, run.mass_flow
        );
    }
    println!("{} runs", runs.len());
    Ok(())
}

pub fn run_run(args: RunArgs) -> Result<()> {
    let (config, runs) = load_sweep(&args.config)?;
    config::check_tools(&config)?;
    let options = RunOptions {
        resume: args.resume,
        only: args.only,
        purge_scratch: args.purge_scratch,
    };
    let pipeline = Pipeline::new(config);
    let report = pipeline.run(runs, &options)?;

    println!(
        "{} of {} runs harvested, {} skipped; results in {}",
        report.completed.len(),
        report.planned,
        report.skipped.len(),
        pipeline.archive().results_csv_path().display()
    );
    if let Some(failure) = report.failure {
        return Err(anyhow!(
            "sweep halted at {} (reached {}): {}",
            failure.run_id,
            failure.reached,
            failure.error
        ));
    }
    println!("Done.");
    Ok(())
}

#[derive(Serialize)]
struct StatusEntry {
    run_id: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct StatusSummary {
    results_csv: String,
    total: usize,
    harvested: usize,
    failed: usize,
    pending: usize,
    runs: Vec<StatusEntry>,
}

pub fn run_status(args: StatusArgs) -> Result<()> {
    let (config, runs) = load_sweep(&args.config)?;
    let summary = status_summary(&config, &runs)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    for entry in &summary.runs {
        match (entry.pressure_ratio, entry.error.as_deref()) {
            (Some(metric), _) => println!("{:<10} {}  {}", entry.state, entry.run_id, metric),
            (None, Some(error)) => println!("{:<10} {}  {}", entry.state, entry.run_id, error),
            (None, None) => println!("{:<10} {}", entry.state, entry.run_id),
        }
    }
    println!(
        "{} harvested, {} failed, {} pending of {}",
        summary.harvested, summary.failed, summary.pending, summary.total
    );
    Ok(())
}

fn status_summary(config: &SweepConfig, runs: &[RunConfig]) -> Result<StatusSummary> {
    let archive = config.archive_paths();
    let csv = ResultsCsv::new(archive.results_csv_path());
    let recorded: BTreeMap<String, f64> = csv.records()?.into_iter().collect();

    let mut entries = Vec::with_capacity(runs.len());
    for run in runs {
        if let Some(metric) = recorded.get(&run.run_id) {
            entries.push(StatusEntry {
                run_id: run.run_id.clone(),
                state: "harvested",
                pressure_ratio: Some(*metric),
                error: None,
            });
            continue;
        }
        let error = failed_case_error(&archive.outcome_path(&run.run_id));
        entries.push(StatusEntry {
            run_id: run.run_id.clone(),
            state: if error.is_some() { "failed" } else { "pending" },
            pressure_ratio: None,
            error,
        });
    }
    let count = |state: &str| entries.iter().filter(|e| e.state == state).count();
    Ok(StatusSummary {
        results_csv: csv.path().display().to_string(),
        total: entries.len(),
        harvested: count("harvested"),
        failed: count("failed"),
        pending: count("pending"),
        runs: entries,
    })
}

/// Error text of a case whose last recorded outcome is a failure.
fn failed_case_error(outcome_path: &Path) -> Option<String> {
    let bytes = fs::read(outcome_path).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    if value["state"] != "failed" {
        return None;
    }
    Some(value["error"].as_str().unwrap_or("failed").to_string())
}

fn load_sweep(path: &Path) -> Result<(SweepConfig, Vec<RunConfig>)> {
    let config =
        config::load_config(path).with_context(|| format!("load sweep config {}", path.display()))?;
    let runs = config.parameters.enumerate()?;
    tracing::debug!(runs = runs.len(), config = %path.display(), "enumerated sweep");
    Ok((config, runs))
}
