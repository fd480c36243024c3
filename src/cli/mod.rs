//! CLI scaffolding: argument parsing, command definitions, dispatch.
pub mod args;
pub mod commands;

pub use args::CompileArgs;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(version = crate::VERSION)]
#[command(about = "Compiles declarative CI pipelines into container execution plans")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Compile pipeline files into an executable plan",
        long_about = "Compile expands matrices, substitutes variables, parses, lints, applies when-filters, and lowers every workflow into its backend representation, printed as JSON.",
        after_help = "Example:\n    pipewright compile .woodpecker/build.yaml --event push --branch main"
    )]
    Compile(CompileArgs),
}

pub fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Compile(compile_args) => commands::compile(compile_args),
    }
}
