//! Sequential parameter sweeps over an external CFD solver pipeline.
//!
//! For each (pitch, rpm, mass flow) combination the pipeline regenerates blade
//! geometry, renders the solver input, runs the solver batch, and harvests the
//! total pressure ratio into an append-only CSV.
pub mod cli;
pub mod config;
pub mod error;
pub mod harvest;
pub mod invoke;
pub mod logging;
pub mod paths;
pub mod run_config;
pub mod sweep;
pub mod template;
pub mod workflow;

pub use error::{SweepError, SweepResult};
pub use run_config::{build_run_id, enumerate_sweep, RunConfig};
pub use sweep::{CaseState, Pipeline, RunOptions, SweepReport};
