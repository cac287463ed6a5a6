//! Cubridor CLI: browser test coverage from the command line
//!
//! ## Usage
//!
//! ```bash
//! cubridor instrument -i src -o instrumented   # Instrument a source tree
//! cubridor report -c coverage -r reports        # Merge and report coverage
//! cubridor run -c cubrir.yaml -- testem ci      # Wrap a test runner
//! ```

use clap::Parser;
use cubridor::{
    handlers::{execute_config, execute_instrument, execute_report, execute_run, execute_serve},
    init_logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    config.color.apply();
    init_logging(&config);

    match cli.command {
        Commands::Instrument(args) => execute_instrument(&config, &args).map(|()| ExitCode::SUCCESS),
        Commands::Report(args) => execute_report(&config, &args).map(|()| ExitCode::SUCCESS),
        Commands::Serve(args) => execute_serve(&config, &args).map(|()| ExitCode::SUCCESS),
        Commands::Run(args) => execute_run(&config, &args),
        Commands::Config(args) => execute_config(&args).map(|()| ExitCode::SUCCESS),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_json(cli.log_json)
}
