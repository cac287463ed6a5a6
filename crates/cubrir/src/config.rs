//! Harness configuration.
//!
//! A [`HarnessConfig`] describes one coverage-enabled test run: which
//! directories are instrumented and served, where per-run working
//! directories live, which reports are produced and what gets cleaned up.
//! It loads from YAML or JSON (by file extension) and can be assembled in
//! code with [`HarnessConfig::builder`].

use crate::error::{CubrirError, CubrirResult};
use crate::instrument::{InstrumentOptions, InstrumentOverrides};
use crate::paths::{unique_dir_name, DirDef, PathResolver};
use crate::report::ReportFormat;
use crate::runner_options::RunnerSettings;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port of the coverage server
pub const DEFAULT_COVERAGE_PORT: u16 = 7000;

/// Default bound on every fixture wait, in milliseconds
pub const DEFAULT_WRAPPED_EVENT_TIMEOUT_MS: u64 = 30_000;

/// How much coverage machinery a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// Plain test run, no coverage
    Base,
    /// Serve pre-instrumented code and collect coverage
    Coverage,
    /// Instrument and collect, leave reporting to a later step
    Instrumentation,
    /// Instrument, collect and report
    #[default]
    Full,
}

impl CoverageMode {
    /// Whether source directories are instrumented at startup
    pub fn instruments(self) -> bool {
        matches!(self, Self::Instrumentation | Self::Full)
    }

    /// Whether the browser loads instrumented code and uploads coverage
    pub fn collects(self) -> bool {
        !matches!(self, Self::Base)
    }

    /// Whether reports are generated at shutdown
    pub fn reports(self) -> bool {
        matches!(self, Self::Full)
    }

    /// Cleanup scope used when none is configured
    pub fn default_cleanup(self) -> CleanupScope {
        match self {
            Self::Base | Self::Coverage => CleanupScope::RunnerContentOnly,
            Self::Instrumentation => CleanupScope::EverythingButCoverage,
            Self::Full => CleanupScope::Everything,
        }
    }
}

/// Which per-run directories a cleanup pass removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupScope {
    /// Nothing
    Nothing,
    /// The runner's user-data directory and its `Temp-*` leftovers
    RunnerContentOnly,
    /// Runner content plus instrumented sources
    EverythingButCoverage,
    /// Runner content, instrumented sources and raw coverage data
    Everything,
}

/// Scopes for the two cleanup passes of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CleanupPlan {
    /// Before instrumentation
    pub initial: CleanupScope,
    /// After reporting
    #[serde(rename = "final")]
    pub final_pass: CleanupScope,
}

impl CleanupPlan {
    /// Same scope for both passes
    pub fn uniform(scope: CleanupScope) -> Self {
        Self {
            initial: scope,
            final_pass: scope,
        }
    }
}

/// Configuration for one coverage-enabled test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HarnessConfig {
    /// Coverage mode
    pub mode: CoverageMode,
    /// Directory relative paths resolve against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Identifier shared by every per-run directory
    pub run_id: String,
    /// Parent of the per-run directories
    pub temp_root: PathBuf,
    /// Port of the coverage server
    pub coverage_port: u16,
    /// Directories holding code under test
    pub source_dirs: BTreeMap<String, DirDef>,
    /// Directories served as-is (tests, fixtures, dependencies)
    pub content_dirs: BTreeMap<String, DirDef>,
    /// Test pages handed to the runner
    pub test_pages: Vec<String>,
    /// Where uploaded coverage lands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_dir: Option<PathBuf>,
    /// Where reports are written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports_dir: Option<PathBuf>,
    /// Where instrumented copies of the source directories go
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrumented_source_dir: Option<PathBuf>,
    /// The runner's user-data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_dir: Option<PathBuf>,
    /// Bound on every fixture wait, in milliseconds
    #[serde(alias = "wrappedEventTimeout", alias = "wrapped_event_timeout")]
    pub wrapped_event_timeout_ms: u64,
    /// Reports produced at shutdown
    pub reports: Vec<ReportFormat>,
    /// Overrides layered over the default instrumentation options
    #[serde(alias = "instrumentationOptions")]
    pub instrumentation: InstrumentOverrides,
    /// Cleanup scopes; defaults follow the mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupPlan>,
    /// Settings passed through to the browser test runner
    pub runner: RunnerSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: CoverageMode::default(),
            cwd: None,
            run_id: uuid::Uuid::new_v4().to_string(),
            temp_root: std::env::temp_dir(),
            coverage_port: DEFAULT_COVERAGE_PORT,
            source_dirs: BTreeMap::new(),
            content_dirs: BTreeMap::new(),
            test_pages: Vec::new(),
            coverage_dir: None,
            reports_dir: None,
            instrumented_source_dir: None,
            runner_dir: None,
            wrapped_event_timeout_ms: DEFAULT_WRAPPED_EVENT_TIMEOUT_MS,
            reports: ReportFormat::defaults(),
            instrumentation: InstrumentOverrides::default(),
            cleanup: None,
            runner: RunnerSettings::default(),
        }
    }
}

impl HarnessConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }

    /// Parse YAML
    pub fn from_yaml_str(text: &str) -> CubrirResult<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Parse JSON
    pub fn from_json_str(text: &str) -> CubrirResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    ///
    /// A missing or relative `cwd` is taken relative to the file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> CubrirResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text)?,
            Some("json") => Self::from_json_str(&text)?,
            _ => {
                return Err(CubrirError::config(format!(
                    "unsupported config format: {}",
                    path.display()
                )))
            }
        };

        let base = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.cwd = Some(match config.cwd.take() {
            Some(cwd) if cwd.is_absolute() => cwd,
            Some(cwd) => base.join(cwd),
            None => base,
        });
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a working run
    pub fn validate(&self) -> CubrirResult<()> {
        if self.coverage_port == 0 {
            return Err(CubrirError::config("coverage_port must be non-zero"));
        }
        if self.wrapped_event_timeout_ms == 0 {
            return Err(CubrirError::config("wrapped_event_timeout_ms must be non-zero"));
        }
        let mut routes = BTreeSet::new();
        for (key, def) in self.source_dirs.iter().chain(&self.content_dirs) {
            let route = def.route_path();
            if !routes.insert(route.clone()) {
                return Err(CubrirError::config(format!(
                    "route {route} of {key} is already served by another directory"
                )));
            }
        }
        Ok(())
    }

    /// Working directory, defaulting to the process's current directory
    pub fn cwd(&self) -> PathBuf {
        self.cwd.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    /// Resolver rooted at [`cwd`](Self::cwd)
    pub fn resolver(&self) -> PathResolver {
        PathResolver::new(self.cwd())
    }

    fn run_dir(&self, configured: Option<&PathBuf>, prefix: &str) -> PathBuf {
        configured.map_or_else(
            || unique_dir_name(&self.temp_root, prefix, &self.run_id),
            |dir| self.resolver().resolve(dir),
        )
    }

    /// Coverage upload directory
    pub fn coverage_dir(&self) -> PathBuf {
        self.run_dir(self.coverage_dir.as_ref(), "coverage")
    }

    /// Report output directory
    pub fn reports_dir(&self) -> PathBuf {
        self.run_dir(self.reports_dir.as_ref(), "reports")
    }

    /// Root of the instrumented source copies
    pub fn instrumented_source_dir(&self) -> PathBuf {
        self.run_dir(self.instrumented_source_dir.as_ref(), "instrumented")
    }

    /// Runner user-data directory
    pub fn runner_dir(&self) -> PathBuf {
        self.run_dir(self.runner_dir.as_ref(), "user_data_dir")
    }

    /// Fixture wait bound
    pub fn wrapped_event_timeout(&self) -> Duration {
        Duration::from_millis(self.wrapped_event_timeout_ms)
    }

    /// Configured cleanup, or the mode's default
    pub fn cleanup_plan(&self) -> CleanupPlan {
        self.cleanup
            .unwrap_or_else(|| CleanupPlan::uniform(self.mode.default_cleanup()))
    }

    /// Base URL of the coverage server
    pub fn coverage_url(&self) -> String {
        format!("http://localhost:{}", self.coverage_port)
    }

    /// Effective instrumentation options
    pub fn instrument_options(&self) -> InstrumentOptions {
        InstrumentOptions::default().merged_with(&self.instrumentation)
    }

    /// Source directories as the browser sees them: the instrumented copies
    /// when the mode collects coverage, the originals otherwise.
    pub fn served_source_dirs(&self) -> BTreeMap<String, DirDef> {
        if self.mode.collects() {
            self.resolver()
                .instrumented_source_dirs(&self.instrumented_source_dir(), &self.source_dirs)
        } else {
            self.source_dirs.clone()
        }
    }
}

/// Builder for [`HarnessConfig`]
#[derive(Debug, Clone, Default)]
pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    /// Set the coverage mode
    #[must_use]
    pub fn mode(mut self, mode: CoverageMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.config.cwd = Some(cwd.into());
        self
    }

    /// Set the run identifier
    #[must_use]
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.config.run_id = run_id.into();
        self
    }

    /// Set the parent of per-run directories
    #[must_use]
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = root.into();
        self
    }

    /// Set the coverage server port
    #[must_use]
    pub fn coverage_port(mut self, port: u16) -> Self {
        self.config.coverage_port = port;
        self
    }

    /// Add a source directory
    #[must_use]
    pub fn source_dir(mut self, key: impl Into<String>, def: DirDef) -> Self {
        self.config.source_dirs.insert(key.into(), def);
        self
    }

    /// Add a content directory
    #[must_use]
    pub fn content_dir(mut self, key: impl Into<String>, def: DirDef) -> Self {
        self.config.content_dirs.insert(key.into(), def);
        self
    }

    /// Add a test page
    #[must_use]
    pub fn test_page(mut self, page: impl Into<String>) -> Self {
        self.config.test_pages.push(page.into());
        self
    }

    /// Set the coverage directory
    #[must_use]
    pub fn coverage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.coverage_dir = Some(dir.into());
        self
    }

    /// Set the reports directory
    #[must_use]
    pub fn reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.reports_dir = Some(dir.into());
        self
    }

    /// Set the instrumented sources root
    #[must_use]
    pub fn instrumented_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.instrumented_source_dir = Some(dir.into());
        self
    }

    /// Set the runner user-data directory
    #[must_use]
    pub fn runner_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.runner_dir = Some(dir.into());
        self
    }

    /// Set the fixture wait bound
    #[must_use]
    pub fn wrapped_event_timeout(mut self, timeout: Duration) -> Self {
        self.config.wrapped_event_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the report formats
    #[must_use]
    pub fn reports(mut self, reports: Vec<ReportFormat>) -> Self {
        self.config.reports = reports;
        self
    }

    /// Set instrumentation overrides
    #[must_use]
    pub fn instrumentation(mut self, overrides: InstrumentOverrides) -> Self {
        self.config.instrumentation = overrides;
        self
    }

    /// Set the cleanup plan
    #[must_use]
    pub fn cleanup(mut self, plan: CleanupPlan) -> Self {
        self.config.cleanup = Some(plan);
        self
    }

    /// Set runner settings
    #[must_use]
    pub fn runner(mut self, runner: RunnerSettings) -> Self {
        self.config.runner = runner;
        self
    }

    /// Validate and build
    pub fn build(self) -> CubrirResult<HarnessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
