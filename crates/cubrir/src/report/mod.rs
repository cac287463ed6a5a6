//! Coverage aggregation and report generation.
//!
//! Every `*.json` file in the coverage directory holds a map of source path
//! to [`FileCoverage`](crate::coverage::FileCoverage). Files are merged into
//! one [`CoverageMap`] (counters summed per path) and rendered once per
//! requested [`ReportFormat`].

mod html;
mod lcov;
mod text;

pub use html::{escape_html, watermark, HtmlFormatter};
pub use lcov::LcovFormatter;
pub use text::{format_pct, text_summary};

use crate::coverage::{CoverageMap, FileSummary};
use crate::error::{CubrirError, CubrirResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    /// `index.html`
    Html,
    /// `coverage-summary.json`
    JsonSummary,
    /// `coverage-summary.txt`, also logged
    TextSummary,
    /// `coverage-final.json` with merged raw counters
    Json,
    /// `lcov.info`
    Lcov,
}

impl ReportFormat {
    /// Every supported format
    pub const ALL: [ReportFormat; 5] = [
        Self::Html,
        Self::JsonSummary,
        Self::TextSummary,
        Self::Json,
        Self::Lcov,
    ];

    /// Default formats for a harness run
    pub fn defaults() -> Vec<ReportFormat> {
        vec![Self::TextSummary, Self::Html, Self::JsonSummary]
    }

    /// Name used in configuration
    pub fn name(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::JsonSummary => "json-summary",
            Self::TextSummary => "text-summary",
            Self::Json => "json",
            Self::Lcov => "lcov",
        }
    }

    /// File written into the reports directory
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Html => "index.html",
            Self::JsonSummary => "coverage-summary.json",
            Self::TextSummary => "coverage-summary.txt",
            Self::Json => "coverage-final.json",
            Self::Lcov => "lcov.info",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportFormat {
    type Err = CubrirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| CubrirError::config(format!("unknown report format: {s}")))
    }
}

/// `coverage-summary.json` layout: a `total` entry plus one entry per file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    /// Totals across all files
    pub total: FileSummary,
    /// Per-file totals
    #[serde(flatten)]
    pub files: BTreeMap<String, FileSummary>,
}

impl SummaryDocument {
    /// Summarise merged coverage
    pub fn from_coverage(coverage: &CoverageMap) -> Self {
        Self {
            total: coverage.summary(),
            files: coverage
                .files()
                .map(|(path, file)| (path.to_string(), file.summary()))
                .collect(),
        }
    }
}

/// What a report run produced
#[derive(Debug, Clone)]
pub struct ReportOutput {
    /// Merged coverage
    pub coverage: CoverageMap,
    /// Totals across all files
    pub summary: FileSummary,
    /// Files written, in format order
    pub artifacts: Vec<PathBuf>,
    /// Coverage files left out of the merge because they could not be read
    pub skipped: Vec<PathBuf>,
}

/// Merged contents of a coverage directory
#[derive(Debug, Clone, Default)]
pub struct LoadedCoverage {
    /// Coverage of every readable file, summed per path
    pub coverage: CoverageMap,
    /// Files that could not be read or parsed
    pub skipped: Vec<PathBuf>,
}

/// Read and merge every `*.json` coverage file in `dir`.
///
/// A file that cannot be read or is not istanbul coverage is logged and
/// skipped; only a missing or unreadable directory is an error.
pub async fn load_coverage_dir(dir: &Path) -> CubrirResult<LoadedCoverage> {
    let mut reader = tokio::fs::read_dir(dir).await.map_err(|err| {
        CubrirError::report(format!("cannot read coverage directory {}: {err}", dir.display()))
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = LoadedCoverage::default();
    for path in paths {
        match read_coverage_file(&path).await {
            Ok(map) => {
                tracing::debug!(file = %path.display(), files = map.len(), "Merging coverage file");
                loaded.coverage.merge(map);
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "Skipping coverage file");
                loaded.skipped.push(path);
            }
        }
    }
    Ok(loaded)
}

async fn read_coverage_file(path: &Path) -> CubrirResult<CoverageMap> {
    let text = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&text).map_err(|err| {
        CubrirError::report(format!("invalid coverage file {}: {err}", path.display()))
    })
}

/// Produces reports from a coverage directory
#[derive(Debug, Clone)]
pub struct Reporter {
    coverage_dir: PathBuf,
    reports_dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl Reporter {
    /// Create a reporter
    pub fn new(
        coverage_dir: impl Into<PathBuf>,
        reports_dir: impl Into<PathBuf>,
        formats: Vec<ReportFormat>,
    ) -> Self {
        Self {
            coverage_dir: coverage_dir.into(),
            reports_dir: reports_dir.into(),
            formats,
        }
    }

    /// Requested formats
    pub fn formats(&self) -> &[ReportFormat] {
        &self.formats
    }

    /// Render one format from merged coverage
    pub fn render(format: ReportFormat, coverage: &CoverageMap) -> CubrirResult<String> {
        Ok(match format {
            ReportFormat::Html => HtmlFormatter::new(coverage).generate(),
            ReportFormat::JsonSummary => {
                serde_json::to_string_pretty(&SummaryDocument::from_coverage(coverage))?
            }
            ReportFormat::TextSummary => text_summary(&coverage.summary()),
            ReportFormat::Json => serde_json::to_string(coverage)?,
            ReportFormat::Lcov => LcovFormatter::new(coverage).generate(),
        })
    }

    /// Merge the coverage directory and write every requested report
    pub async fn generate(&self) -> CubrirResult<ReportOutput> {
        let LoadedCoverage { coverage, skipped } = load_coverage_dir(&self.coverage_dir).await?;
        tracing::info!(
            coverage_dir = %self.coverage_dir.display(),
            files = coverage.len(),
            skipped = skipped.len(),
            "Loaded coverage data"
        );
        tokio::fs::create_dir_all(&self.reports_dir).await?;

        let mut artifacts = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let content = Self::render(*format, &coverage)?;
            if *format == ReportFormat::TextSummary {
                tracing::info!("\n{content}");
            }
            let path = self.reports_dir.join(format.file_name());
            tokio::fs::write(&path, content).await?;
            tracing::debug!(format = %format, path = %path.display(), "Wrote report");
            artifacts.push(path);
        }

        Ok(ReportOutput {
            summary: coverage.summary(),
            coverage,
            artifacts,
            skipped,
        })
    }
}

/// Merge `coverage_dir` and write `formats` into `reports_dir`
pub async fn report(
    coverage_dir: impl Into<PathBuf>,
    reports_dir: impl Into<PathBuf>,
    formats: Vec<ReportFormat>,
) -> CubrirResult<ReportOutput> {
    Reporter::new(coverage_dir, reports_dir, formats).generate().await
}
