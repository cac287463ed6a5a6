//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use cubrir::ReportFormat;
use std::path::PathBuf;

/// Cubridor: instrument, serve, collect and report browser test coverage
#[derive(Parser, Debug)]
#[command(name = "cubridor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Instrument a source tree into an output tree
    Instrument(InstrumentArgs),

    /// Merge collected coverage and write reports
    Report(ReportArgs),

    /// Serve content and collect coverage until interrupted
    Serve(ServeArgs),

    /// Run an external test runner inside the coverage lifecycle
    Run(RunArgs),

    /// Show the effective harness configuration
    Config(ConfigArgs),
}

/// Arguments for the instrument command
#[derive(Parser, Debug)]
pub struct InstrumentArgs {
    /// Directory to instrument
    #[arg(short, long)]
    pub input_path: PathBuf,

    /// Directory to write instrumented output to
    #[arg(short, long)]
    pub output_path: PathBuf,

    /// Files carried into the output (replaces the defaults)
    #[arg(long = "includes")]
    pub includes: Vec<String>,

    /// Files left out of the output (replaces the defaults)
    #[arg(long = "excludes")]
    pub excludes: Vec<String>,

    /// Files to instrument (replaces the defaults)
    #[arg(long = "sources")]
    pub sources: Vec<String>,

    /// Files copied verbatim (replaces the defaults)
    #[arg(long = "non-sources")]
    pub non_sources: Vec<String>,

    /// Skip source map generation
    #[arg(long)]
    pub no_source_map: bool,

    /// Global the instrumented code records into
    #[arg(long)]
    pub coverage_variable: Option<String>,

    /// YAML or JSON file with instrumentation options
    #[arg(long)]
    pub options_file: Option<PathBuf>,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Directory holding coverage JSON files
    #[arg(short, long)]
    pub coverage_dir: PathBuf,

    /// Directory to write reports to
    #[arg(short, long)]
    pub reports_dir: PathBuf,

    /// Report formats
    #[arg(
        short,
        long = "format",
        value_delimiter = ',',
        value_parser = parse_report_format,
        default_value = "text-summary,html,json-summary"
    )]
    pub formats: Vec<ReportFormat>,
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Harness configuration file (YAML or JSON)
    #[arg(short, long, default_value = "cubrir.yaml")]
    pub config: PathBuf,

    /// Override the coverage port
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Harness configuration file (YAML or JSON)
    #[arg(short, long, default_value = "cubrir.yaml")]
    pub config: PathBuf,

    /// Use headless browser arguments regardless of HEADLESS
    #[arg(long)]
    pub headless: bool,

    /// Where to write the generated runner options
    #[arg(long)]
    pub runner_options: Option<PathBuf>,

    /// Runner command and its arguments
    #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Harness configuration file; defaults are shown when absent
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Show the generated runner options instead
    #[arg(long)]
    pub runner: bool,

    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,
}

/// Output format for the config command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    #[default]
    Yaml,
    /// JSON
    Json,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

fn parse_report_format(value: &str) -> Result<ReportFormat, String> {
    value.parse().map_err(|err: cubrir::CubrirError| err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_instrument_command() {
            let cli = Cli::parse_from([
                "cubridor",
                "instrument",
                "--input-path",
                "src",
                "--output-path",
                "out",
                "--excludes",
                "./src/text/sample.txt",
                "--no-source-map",
            ]);
            if let Commands::Instrument(args) = cli.command {
                assert_eq!(args.input_path, PathBuf::from("src"));
                assert_eq!(args.excludes, vec!["./src/text/sample.txt"]);
                assert!(args.includes.is_empty());
                assert!(args.no_source_map);
            } else {
                panic!("expected Instrument command");
            }
        }

        #[test]
        fn test_parse_report_defaults() {
            let cli = Cli::parse_from(["cubridor", "report", "-c", "cov", "-r", "reports"]);
            if let Commands::Report(args) = cli.command {
                assert_eq!(args.formats, ReportFormat::defaults());
            } else {
                panic!("expected Report command");
            }
        }

        #[test]
        fn test_parse_report_formats() {
            let cli = Cli::parse_from([
                "cubridor", "report", "-c", "cov", "-r", "reports", "--format", "lcov,json",
            ]);
            if let Commands::Report(args) = cli.command {
                assert_eq!(args.formats, vec![ReportFormat::Lcov, ReportFormat::Json]);
            } else {
                panic!("expected Report command");
            }
        }

        #[test]
        fn test_unknown_report_format_rejected() {
            let result = Cli::try_parse_from([
                "cubridor", "report", "-c", "cov", "-r", "reports", "--format", "cobertura",
            ]);
            assert!(result.is_err());
        }

        #[test]
        fn test_parse_run_trailing_command() {
            let cli = Cli::parse_from([
                "cubridor", "run", "--headless", "testem", "ci", "--file", "testem.js",
            ]);
            if let Commands::Run(args) = cli.command {
                assert!(args.headless);
                assert_eq!(args.config, PathBuf::from("cubrir.yaml"));
                assert_eq!(args.command, vec!["testem", "ci", "--file", "testem.js"]);
            } else {
                panic!("expected Run command");
            }
        }

        #[test]
        fn test_run_requires_command() {
            assert!(Cli::try_parse_from(["cubridor", "run"]).is_err());
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::parse_from(["cubridor", "config", "-vv", "--color", "never", "--runner"]);
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.color, ColorArg::Never));
            if let Commands::Config(args) = cli.command {
                assert!(args.runner);
                assert_eq!(args.format, ConfigFormat::Yaml);
            } else {
                panic!("expected Config command");
            }
        }

        #[test]
        fn test_parse_serve_port() {
            let cli = Cli::parse_from(["cubridor", "serve", "-c", "harness.json", "-p", "7017"]);
            if let Commands::Serve(args) = cli.command {
                assert_eq!(args.port, Some(7017));
                assert_eq!(args.config, PathBuf::from("harness.json"));
            } else {
                panic!("expected Serve command");
            }
        }
    }
}
