//! CLI argument parsing for the sweep workflow.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "sweep.json";

#[derive(Parser, Debug)]
#[command(
    name = "cfdsweep",
    version,
    about = "Sequential parameter sweeps over a CFD solver batch pipeline",
    after_help = "Commands:\n  init --config <file>     Write a config stub\n  plan --config <file>     List the run ids of the sweep\n  run --config <file>      Execute the sweep, halting on the first failure\n  status --config <file>   Show harvested and pending runs\n\nExamples:\n  cfdsweep init --config sweep.json\n  cfdsweep plan --config sweep.json --json\n  cfdsweep run --config sweep.json --resume\n  cfdsweep status --config sweep.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Emit debug-level diagnostics on stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Plan(PlanArgs),
    Run(RunArgs),
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Write a sweep config stub")]
pub struct InitArgs {
    /// Sweep config file to create
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List the configurations of a sweep")]
pub struct PlanArgs {
    /// Sweep config file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Execute the sweep sequentially")]
pub struct RunArgs {
    /// Sweep config file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Skip run ids already recorded in the results CSV
    #[arg(long)]
    pub resume: bool,

    /// Only run the named run id (repeatable)
    #[arg(long, value_name = "RUN_ID")]
    pub only: Vec<String>,

    /// Delete leftover scratch artifacts before the first case
    #[arg(long)]
    pub purge_scratch: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Show harvested and pending runs")]
pub struct StatusArgs {
    /// Sweep config file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
