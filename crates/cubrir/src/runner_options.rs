//! Options handed to the external browser test runner.
//!
//! The runner hosts nothing itself: every source and content route, plus the
//! coverage endpoint, is proxied to the coverage server.

use crate::config::HarnessConfig;
use crate::paths::DirDef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment variable that switches browsers to their headless arguments
pub const HEADLESS_ENV: &str = "HEADLESS";

/// Route the coverage receiver and client are served under
pub const COVERAGE_ROUTE: &str = "/coverage";

/// Browser name to command-line arguments
pub type BrowserArgs = BTreeMap<String, Vec<String>>;

fn args(pairs: &[(&str, &[&str])]) -> BrowserArgs {
    pairs
        .iter()
        .map(|(browser, list)| {
            (
                (*browser).to_string(),
                list.iter().map(|arg| (*arg).to_string()).collect(),
            )
        })
        .collect()
}

/// Arguments for interactive browsers
pub fn default_browser_args() -> BrowserArgs {
    args(&[
        ("Firefox", &["--no-remote"]),
        (
            "Chrome",
            &[
                "--disable-extensions",
                "--memory-pressure-threshholds=1",
                "--disk-cache-size=0",
                "--disable-new-zip-unpacker",
            ],
        ),
    ])
}

/// Arguments for headless browsers
pub fn default_headless_browser_args() -> BrowserArgs {
    args(&[
        ("Firefox", &["--no-remote", "--headless"]),
        (
            "Chrome",
            &["--disable-gpu", "--headless", "--remote-debugging-port=9222"],
        ),
    ])
}

/// Whether `HEADLESS` is set in the environment
pub fn headless_from_env() -> bool {
    std::env::var_os(HEADLESS_ENV).is_some_and(|value| !value.is_empty())
}

/// Runner settings carried in [`HarnessConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunnerSettings {
    /// Test framework the pages use
    pub framework: String,
    /// Seconds before a silent browser counts as disconnected
    pub browser_disconnect_timeout: u64,
    /// Seconds a browser may take to start
    pub browser_start_timeout: u64,
    /// Seconds a test page may run
    pub timeout: u64,
    /// Suppress passing-test logs in TAP output
    pub tap_quiet_logs: bool,
    /// Extra routes proxied to the coverage server
    pub additional_proxies: Vec<String>,
    /// Interactive browser arguments
    #[serde(alias = "browserArgs")]
    pub browser_args: BrowserArgs,
    /// Headless browser arguments
    #[serde(alias = "headlessBrowserArgs")]
    pub headless_browser_args: BrowserArgs,
    /// Force headless on or off; unset reads `HEADLESS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            framework: "qunit".to_string(),
            browser_disconnect_timeout: 300,
            browser_start_timeout: 300,
            timeout: 300,
            tap_quiet_logs: true,
            additional_proxies: Vec::new(),
            browser_args: default_browser_args(),
            headless_browser_args: default_headless_browser_args(),
            headless: None,
        }
    }
}

impl RunnerSettings {
    /// Browser arguments for the requested mode. Headless falls back to the
    /// interactive set when no headless arguments are configured.
    pub fn browser_args(&self, headless: bool) -> &BrowserArgs {
        if headless && !self.headless_browser_args.is_empty() {
            &self.headless_browser_args
        } else {
            &self.browser_args
        }
    }

    /// Effective headless flag
    pub fn is_headless(&self) -> bool {
        self.headless.unwrap_or_else(headless_from_env)
    }
}

/// A proxy destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    /// Upstream base URL
    pub target: String,
}

/// Proxy every source and content route, the extra routes and
/// [`COVERAGE_ROUTE`] to `coverage_url`.
pub fn construct_proxies<'a>(
    dirs: impl IntoIterator<Item = &'a DirDef>,
    additional: &[String],
    coverage_url: &str,
) -> BTreeMap<String, ProxyTarget> {
    let target = ProxyTarget {
        target: coverage_url.to_string(),
    };
    dirs.into_iter()
        .map(DirDef::proxy_path)
        .chain(additional.iter().cloned())
        .chain(std::iter::once(COVERAGE_ROUTE.to_string()))
        .map(|path| (path, target.clone()))
        .collect()
}

/// Configuration document for the external test runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TestRunnerOptions {
    /// Test framework
    pub framework: String,
    /// Test pages to open
    pub test_page: Vec<String>,
    /// Routes forwarded to the coverage server
    pub proxies: BTreeMap<String, ProxyTarget>,
    /// Per-browser arguments
    pub browser_args: BrowserArgs,
    /// Disconnect timeout in seconds
    pub browser_disconnect_timeout: u64,
    /// Start timeout in seconds
    pub browser_start_timeout: u64,
    /// Page timeout in seconds
    pub timeout: u64,
    /// Quiet TAP logs
    pub tap_quiet_logs: bool,
    /// TAP report destination
    pub report_file: PathBuf,
    /// Browser profile directory
    pub user_data_dir: PathBuf,
    /// Runner working directory
    pub cwd: PathBuf,
    /// Files the runner watches and hosts; always empty
    pub src_files: Vec<String>,
    /// Extra files the runner hosts; always empty
    pub serve_files: Vec<String>,
}

impl TestRunnerOptions {
    /// Build runner options, reading `HEADLESS` unless the settings force it
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::with_headless(config, config.runner.is_headless())
    }

    /// Build runner options for an explicit headless choice
    pub fn with_headless(config: &HarnessConfig, headless: bool) -> Self {
        let runner = &config.runner;
        let served = config.served_source_dirs();
        let proxies = construct_proxies(
            served.values().chain(config.content_dirs.values()),
            &runner.additional_proxies,
            &config.coverage_url(),
        );
        Self {
            framework: runner.framework.clone(),
            test_page: config.test_pages.clone(),
            proxies,
            browser_args: runner.browser_args(headless).clone(),
            browser_disconnect_timeout: runner.browser_disconnect_timeout,
            browser_start_timeout: runner.browser_start_timeout,
            timeout: runner.timeout,
            tap_quiet_logs: runner.tap_quiet_logs,
            report_file: config.reports_dir().join("report.tap"),
            user_data_dir: config.runner_dir(),
            cwd: config.cwd(),
            src_files: Vec::new(),
            serve_files: Vec::new(),
        }
    }
}
