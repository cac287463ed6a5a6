//! Run command handler: wraps an external browser test runner in the
//! coverage lifecycle.
//!
//! The runner is told where things are through two environment variables:
//! `CUBRIR_RUNNER_OPTIONS` (path of the generated runner options JSON) and
//! `CUBRIR_COVERAGE_URL` (base URL of the coverage server).

use super::serve::report_failures;
use super::{load_harness, runtime};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::server::{CoverageServer, CoverageServerConfig};
use crate::RunArgs;
use cubrir::{HarnessConfig, LifecycleHooks, Orchestrator, TestRunnerOptions};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::{ExitCode, ExitStatus};
use tokio::sync::oneshot;

/// Environment variable holding the runner options path
pub const RUNNER_OPTIONS_ENV: &str = "CUBRIR_RUNNER_OPTIONS";

/// Environment variable holding the coverage server URL
pub const COVERAGE_URL_ENV: &str = "CUBRIR_COVERAGE_URL";

/// Execute the run command, returning the runner's exit code
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<ExitCode> {
    let harness = load_harness(&args.config)?;
    let headless = args.headless || harness.runner.is_headless();
    let options = TestRunnerOptions::with_headless(&harness, headless);
    let options_path = args
        .runner_options
        .clone()
        .unwrap_or_else(|| default_options_path(&harness));
    let quiet = config.verbosity.is_quiet();
    runtime()?.block_on(run_lifecycle(harness, options, options_path, &args.command, quiet))
}

/// Runner options land in the runner directory unless a path is given
#[must_use]
pub fn default_options_path(harness: &HarnessConfig) -> PathBuf {
    harness.runner_dir().join("runner-options.json")
}

/// Exit code byte for a child's status; signals and out-of-range codes map to 1
#[must_use]
pub fn status_byte(status: ExitStatus) -> u8 {
    status
        .code()
        .map_or(1, |code| u8::try_from(code).unwrap_or(1))
}

/// Map a child's exit status onto this process's exit code
#[must_use]
pub fn exit_code(status: ExitStatus) -> ExitCode {
    ExitCode::from(status_byte(status))
}

async fn run_lifecycle(
    harness: HarnessConfig,
    options: TestRunnerOptions,
    options_path: PathBuf,
    command: &[String],
    quiet: bool,
) -> CliResult<ExitCode> {
    let server = CoverageServer::new(CoverageServerConfig::from_harness(&harness));
    let coverage_url = harness.coverage_url();
    let cwd = harness.cwd();
    let mut orchestrator = Orchestrator::new(harness).with_fixture(server);

    let (started_tx, started_rx) = oneshot::channel();
    orchestrator
        .on_start(
            json!({ "command": command }),
            Box::new(move || {
                let _ = started_tx.send(());
            }),
        )
        .await;
    if started_rx.await.is_err() {
        tracing::warn!("Start hook finished without signalling");
    }
    let start_phases = orchestrator.history().len();
    report_failures(orchestrator.history());

    // The initial cleanup may remove the runner directory, so the options
    // file is written only once the start chain is over.
    let status = match write_options(&options_path, &options).await {
        Ok(()) => spawn_runner(command, &cwd, &options_path, &coverage_url).await,
        Err(err) => Err(err),
    };

    let (exited_tx, exited_rx) = oneshot::channel();
    let exit_data = match &status {
        Ok(status) => json!({ "code": status.code() }),
        Err(err) => json!({ "error": err.to_string() }),
    };
    orchestrator
        .on_exit(
            exit_data,
            Box::new(move || {
                let _ = exited_tx.send(());
            }),
        )
        .await;
    if exited_rx.await.is_err() {
        tracing::warn!("Exit hook finished without signalling");
    }
    report_failures(&orchestrator.history()[start_phases..]);

    if let Some(report) = orchestrator.last_report() {
        if !quiet {
            println!("{}", super::report::format_output(report));
        }
    }
    Ok(exit_code(status?))
}

async fn write_options(path: &Path, options: &TestRunnerOptions) -> CliResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string_pretty(options)
        .map_err(|e| CliError::runner(format!("cannot encode runner options: {e}")))?;
    tokio::fs::write(path, text).await?;
    tracing::debug!(path = %path.display(), "Wrote runner options");
    Ok(())
}

async fn spawn_runner(
    command: &[String],
    cwd: &Path,
    options_path: &Path,
    coverage_url: &str,
) -> CliResult<ExitStatus> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| CliError::invalid_argument("no runner command given"))?;
    tracing::info!(program = %program, args = ?rest, "Launching test runner");
    tokio::process::Command::new(program)
        .args(rest)
        .current_dir(cwd)
        .env(RUNNER_OPTIONS_ENV, options_path)
        .env(COVERAGE_URL_ENV, coverage_url)
        .status()
        .await
        .map_err(|e| CliError::runner(format!("cannot launch {program}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_options_path() {
        let harness = HarnessConfig::builder()
            .run_id("abc")
            .temp_root("/tmp/cubrir-test")
            .build()
            .unwrap();
        assert_eq!(
            default_options_path(&harness),
            harness.runner_dir().join("runner-options.json")
        );
        assert!(default_options_path(&harness).starts_with("/tmp/cubrir-test"));
    }

    #[cfg(unix)]
    #[test]
    fn test_status_byte() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status_byte(ExitStatus::from_raw(0)), 0);
        assert_eq!(status_byte(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(status_byte(ExitStatus::from_raw(9)), 1);
    }

    #[tokio::test]
    async fn test_write_options_creates_parent() {
        let dir = TempDir::new().unwrap();
        let harness = HarnessConfig::builder()
            .cwd(dir.path())
            .temp_root(dir.path())
            .build()
            .unwrap();
        let path = dir.path().join("nested/runner-options.json");
        write_options(&path, &TestRunnerOptions::with_headless(&harness, true))
            .await
            .unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["framework"], "qunit");
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = spawn_runner(
            &["cubrir-no-such-runner".to_string()],
            Path::new("."),
            Path::new("options.json"),
            "http://localhost:7000",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CliError::Runner { .. }));
    }
}
