//! Cubridor: command-line front end for the Cubrir coverage harness.
//!
//! Subcommands:
//! - `instrument`: copy a source tree, instrumenting its JavaScript
//! - `report`: merge uploaded coverage and write reports
//! - `serve`: run the coverage server around an interactive session
//! - `run`: wrap an external browser test runner in the coverage lifecycle
//! - `config`: print the effective harness or runner configuration

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
pub mod server;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, ConfigFormat, InstrumentArgs, ReportArgs, RunArgs,
    ServeArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use logging::init_logging;
pub use server::{CoverageServer, CoverageServerConfig, Mount};
