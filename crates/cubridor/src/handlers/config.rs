//! Config command handler

use super::load_harness;
use crate::commands::ConfigFormat;
use crate::error::{CliError, CliResult};
use crate::ConfigArgs;
use cubrir::{HarnessConfig, TestRunnerOptions};
use serde::Serialize;

/// Execute the config command
pub fn execute_config(args: &ConfigArgs) -> CliResult<()> {
    let harness = match &args.config {
        Some(path) => load_harness(path)?,
        None => HarnessConfig::default(),
    };
    let text = if args.runner {
        render_config(&TestRunnerOptions::from_config(&harness), args.format)?
    } else {
        render_config(&harness, args.format)?
    };
    print!("{text}");
    Ok(())
}

/// Render any serializable configuration in the chosen format
pub fn render_config<T: Serialize>(value: &T, format: ConfigFormat) -> CliResult<String> {
    match format {
        ConfigFormat::Yaml => serde_yaml_ng::to_string(value)
            .map_err(|e| CliError::config(format!("cannot render YAML: {e}"))),
        ConfigFormat::Json => serde_json::to_string_pretty(value)
            .map(|text| text + "\n")
            .map_err(|e| CliError::config(format!("cannot render JSON: {e}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults_yaml() {
        let text = render_config(&HarnessConfig::default(), ConfigFormat::Yaml).unwrap();
        assert!(text.contains("mode: full"));
        assert!(text.contains("coverage_port: 7000"));
    }

    #[test]
    fn test_render_runner_json() {
        let harness = HarnessConfig::default();
        let text = render_config(
            &TestRunnerOptions::with_headless(&harness, false),
            ConfigFormat::Json,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["framework"], "qunit");
        assert!(value["proxies"]["/coverage"].is_object());
    }

    #[test]
    fn test_rendered_yaml_loads_back() {
        let original = HarnessConfig::default();
        let text = render_config(&original, ConfigFormat::Yaml).unwrap();
        let parsed = HarnessConfig::from_yaml_str(&text).unwrap();
        assert_eq!(parsed, original);
    }
}
