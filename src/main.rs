use anyhow::Result;
use cfd_sweep::cli::{Command, RootArgs};
use cfd_sweep::{logging, workflow};
use clap::Parser;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    logging::init_logging(args.verbose);

    match args.command {
        Command::Init(args) => workflow::run_init(args),
        Command::Plan(args) => workflow::run_plan(args),
        Command::Run(args) => workflow::run_run(args),
        Command::Status(args) => workflow::run_status(args),
    }
}
