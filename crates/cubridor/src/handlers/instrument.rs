//! Instrument command handler

use super::runtime;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::InstrumentArgs;
use console::style;
use cubrir::{InstrumentOverrides, InstrumentSummary, PatternSet};
use std::path::Path;

/// Execute the instrument command
pub fn execute_instrument(config: &CliConfig, args: &InstrumentArgs) -> CliResult<()> {
    if !args.input_path.is_dir() {
        return Err(CliError::invalid_argument(format!(
            "input path is not a directory: {}",
            args.input_path.display()
        )));
    }
    let overrides = build_overrides(args)?;
    let summary = runtime()?.block_on(cubrir::instrument(
        &args.input_path,
        &args.output_path,
        &overrides,
    ))?;
    if !config.verbosity.is_quiet() {
        println!("{}", format_summary(&summary, &args.output_path));
    }
    Ok(())
}

/// Read instrumentation overrides from a YAML or JSON file
pub fn load_overrides(path: &Path) -> CliResult<InstrumentOverrides> {
    let text = std::fs::read_to_string(path)?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&text).map_err(|e| CliError::config(format!("{}: {e}", path.display())))
    } else {
        serde_yaml_ng::from_str(&text)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))
    }
}

fn non_empty(patterns: &[String]) -> Option<PatternSet> {
    (!patterns.is_empty()).then(|| PatternSet::new(patterns.iter().cloned()))
}

/// Options file overrides with the command-line flags layered on top
pub fn build_overrides(args: &InstrumentArgs) -> CliResult<InstrumentOverrides> {
    let base = match &args.options_file {
        Some(path) => load_overrides(path)?,
        None => InstrumentOverrides::default(),
    };
    let flags = InstrumentOverrides {
        includes: non_empty(&args.includes),
        excludes: non_empty(&args.excludes),
        sources: non_empty(&args.sources),
        non_sources: non_empty(&args.non_sources),
        produce_source_map: args.no_source_map.then_some(false),
        coverage_variable: args.coverage_variable.clone(),
    };
    Ok(base.overlay(&flags))
}

fn format_summary(summary: &InstrumentSummary, output: &Path) -> String {
    format!(
        "{} Instrumented {} file(s), copied {}, skipped {} into {}",
        style("✓").green().bold(),
        style(summary.instrumented.len()).cyan(),
        summary.copied.len(),
        summary.skipped,
        output.display()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args() -> InstrumentArgs {
        InstrumentArgs {
            input_path: PathBuf::from("src"),
            output_path: PathBuf::from("out"),
            includes: Vec::new(),
            excludes: Vec::new(),
            sources: Vec::new(),
            non_sources: Vec::new(),
            no_source_map: false,
            coverage_variable: None,
            options_file: None,
        }
    }

    #[test]
    fn test_no_flags_means_no_overrides() {
        assert_eq!(build_overrides(&args()).unwrap(), InstrumentOverrides::default());
    }

    #[test]
    fn test_flags_replace_fields() {
        let mut args = args();
        args.excludes = vec!["./text/sample.txt".to_string()];
        args.no_source_map = true;
        let overrides = build_overrides(&args).unwrap();
        assert_eq!(overrides.excludes, Some(PatternSet::new(["./text/sample.txt"])));
        assert_eq!(overrides.produce_source_map, Some(false));
        assert!(overrides.includes.is_none());
    }

    #[test]
    fn test_flags_win_over_options_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("instrument.yaml");
        std::fs::write(
            &file,
            "sources: ['./lib/**/*.js']\ncoverageVariable: __file_cov__\n",
        )
        .unwrap();
        let mut args = args();
        args.options_file = Some(file);
        args.coverage_variable = Some("__flag_cov__".to_string());
        let overrides = build_overrides(&args).unwrap();
        assert_eq!(overrides.sources, Some(PatternSet::new(["./lib/**/*.js"])));
        assert_eq!(overrides.coverage_variable.as_deref(), Some("__flag_cov__"));
    }

    #[test]
    fn test_json_options_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("instrument.json");
        std::fs::write(&file, r#"{"produce_source_map": false}"#).unwrap();
        assert_eq!(load_overrides(&file).unwrap().produce_source_map, Some(false));
    }

    #[test]
    fn test_bad_options_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("instrument.json");
        std::fs::write(&file, "{").unwrap();
        assert!(matches!(load_overrides(&file), Err(CliError::Config { .. })));
    }

    #[test]
    fn test_missing_input_dir() {
        let mut args = args();
        args.input_path = PathBuf::from("/no/such/input");
        let err = execute_instrument(&CliConfig::new(), &args).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { .. }));
    }
}
