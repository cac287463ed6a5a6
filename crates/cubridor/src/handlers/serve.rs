//! Serve command handler: the full coverage lifecycle around an interactive
//! session that ends with Ctrl-C.

use super::{load_harness, runtime};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::server::{CoverageServer, CoverageServerConfig};
use crate::ServeArgs;
use console::style;
use cubrir::{HarnessConfig, Orchestrator, PhaseRecord};

/// Execute the serve command
pub fn execute_serve(config: &CliConfig, args: &ServeArgs) -> CliResult<()> {
    let harness = apply_port(load_harness(&args.config)?, args.port)?;
    let quiet = config.verbosity.is_quiet();
    runtime()?.block_on(async move {
        let server = CoverageServer::new(CoverageServerConfig::from_harness(&harness));
        let url = harness.coverage_url();
        let mut orchestrator = Orchestrator::new(harness).with_fixture(server);

        let started = orchestrator.start().await;
        report_failures(&started);
        if !quiet {
            println!(
                "{} Serving coverage at {} (Ctrl-C to stop)",
                style("▶").green().bold(),
                style(&url).cyan()
            );
        }

        let interrupted = tokio::signal::ctrl_c().await;
        let finished = orchestrator.exit().await;
        report_failures(&finished);
        if let Some(report) = orchestrator.last_report() {
            if !quiet {
                println!("{}", super::report::format_output(report));
            }
        }
        interrupted.map_err(|e| CliError::server(format!("cannot listen for Ctrl-C: {e}")))
    })
}

/// Replace the configured port and re-check the configuration
pub fn apply_port(mut harness: HarnessConfig, port: Option<u16>) -> CliResult<HarnessConfig> {
    if let Some(port) = port {
        harness.coverage_port = port;
        harness.validate()?;
    }
    Ok(harness)
}

/// Log every phase that did not succeed
pub(crate) fn report_failures(records: &[PhaseRecord]) {
    for record in records.iter().filter(|r| !r.outcome.is_success()) {
        tracing::warn!(phase = %record.phase, outcome = ?record.outcome, "Lifecycle phase did not complete");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_port_override() {
        let harness = apply_port(HarnessConfig::default(), Some(7100)).unwrap();
        assert_eq!(harness.coverage_port, 7100);
        assert_eq!(harness.coverage_url(), "http://localhost:7100");
    }

    #[test]
    fn test_apply_port_none_keeps_config() {
        let harness = apply_port(HarnessConfig::default(), None).unwrap();
        assert_eq!(harness.coverage_port, cubrir::config::DEFAULT_COVERAGE_PORT);
    }

    #[test]
    fn test_apply_port_zero_rejected() {
        assert!(apply_port(HarnessConfig::default(), Some(0)).is_err());
    }
}
