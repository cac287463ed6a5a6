//! Report command handler

use super::runtime;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::ReportArgs;
use console::style;
use cubrir::report::text_summary;
use cubrir::ReportOutput;

/// Execute the report command
pub fn execute_report(config: &CliConfig, args: &ReportArgs) -> CliResult<()> {
    if !args.coverage_dir.is_dir() {
        return Err(CliError::invalid_argument(format!(
            "coverage directory does not exist: {}",
            args.coverage_dir.display()
        )));
    }
    let output = runtime()?.block_on(cubrir::report(
        &args.coverage_dir,
        &args.reports_dir,
        args.formats.clone(),
    ))?;
    if !config.verbosity.is_quiet() {
        println!("{}", format_output(&output));
    }
    Ok(())
}

/// Console rendering of a finished report run
#[must_use]
pub fn format_output(output: &ReportOutput) -> String {
    let mut text = text_summary(&output.summary);
    text.push('\n');
    text.push_str(&format!(
        "{} {} file(s) merged\n",
        style("✓").green().bold(),
        output.coverage.len()
    ));
    if !output.skipped.is_empty() {
        text.push_str(&format!(
            "{} {} file(s) skipped\n",
            style("!").yellow().bold(),
            output.skipped.len()
        ));
        for path in &output.skipped {
            text.push_str(&format!("  {}\n", style(path.display()).dim()));
        }
    }
    for artifact in &output.artifacts {
        text.push_str(&format!("  {}\n", style(artifact.display()).dim()));
    }
    text
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cubrir::ReportFormat;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_missing_coverage_dir() {
        let args = ReportArgs {
            coverage_dir: PathBuf::from("/no/such/coverage"),
            reports_dir: PathBuf::from("/tmp/reports"),
            formats: ReportFormat::defaults(),
        };
        assert!(matches!(
            execute_report(&CliConfig::new(), &args),
            Err(CliError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_empty_coverage_dir_still_reports() {
        let dir = TempDir::new().unwrap();
        let coverage = dir.path().join("coverage");
        std::fs::create_dir_all(&coverage).unwrap();
        let reports = dir.path().join("reports");
        let args = ReportArgs {
            coverage_dir: coverage,
            reports_dir: reports.clone(),
            formats: vec![ReportFormat::JsonSummary],
        };
        execute_report(&CliConfig::new(), &args).unwrap();
        assert!(reports.join("coverage-summary.json").is_file());
    }

    #[test]
    fn test_format_output_lists_skipped_files() {
        let output = ReportOutput {
            coverage: cubrir::CoverageMap::new(),
            summary: cubrir::FileSummary::default(),
            artifacts: vec![PathBuf::from("/reports/index.html")],
            skipped: vec![PathBuf::from("/coverage/partial.json")],
        };
        let text = format_output(&output);
        assert!(text.contains("1 file(s) skipped"));
        assert!(text.contains("/coverage/partial.json"));
        assert!(text.contains("/reports/index.html"));
    }
}
