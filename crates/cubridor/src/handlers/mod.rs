//! Command handlers - extracted from main.rs for testability
//!
//! Each handler module holds the execution logic for one subcommand plus
//! the pure helpers it is built from.

pub mod config;
pub mod instrument;
pub mod report;
pub mod run;
pub mod serve;

pub use config::{execute_config, render_config};
pub use instrument::{build_overrides, execute_instrument, load_overrides};
pub use report::execute_report;
pub use run::{default_options_path, execute_run, exit_code, status_byte};
pub use serve::execute_serve;

use crate::error::{CliError, CliResult};
use cubrir::HarnessConfig;
use std::path::Path;

/// Load a harness configuration file, naming the file in the error
pub fn load_harness(path: &Path) -> CliResult<HarnessConfig> {
    if !path.exists() {
        return Err(CliError::config(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    Ok(HarnessConfig::from_path(path)?)
}

/// Multi-threaded runtime for a handler
pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(CliError::Io)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_harness_missing_file() {
        let err = load_harness(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_load_harness_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cubrir.yaml");
        std::fs::write(&path, "mode: coverage\ncoverage_port: 7010\n").unwrap();
        let harness = load_harness(&path).unwrap();
        assert_eq!(harness.coverage_port, 7010);
        assert_eq!(harness.cwd(), dir.path());
    }
}
