//! ksd CLI entry point.

use clap::Parser;
use ksd::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    let cli = Cli::parse();
    cli::init_logging(cli.debug);

    let result = match &cli.command {
        Commands::Build(args) => cli::run_build(args),
        Commands::Sync(args) => cli::run_sync(args),
        Commands::Run(args) => cli::run_run(args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
