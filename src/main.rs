use clap::Parser;
use pipewright::{cli, logging, Result};

fn main() -> Result<()> {
    let args = cli::Args::parse();

    let _logging_guard = logging::init()?;

    cli::run(args)
}
