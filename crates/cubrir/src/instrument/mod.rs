//! Directory-tree instrumentation.
//!
//! An [`InstrumentationJob`] walks an input tree and mirrors it into an
//! output tree. Every file passes two filters:
//!
//! 1. `includes`/`excludes` decide whether the file is carried over at all.
//! 2. `sources`/`non_sources` decide whether a carried file is instrumented
//!    or copied verbatim.
//!
//! All file operations within a directory level run concurrently, and the
//! job finishes only after every one of them has settled. Failures are
//! collected rather than short-circuiting, so one bad file never leaves its
//! siblings half-written.

mod source_map;
mod transform;

pub use transform::{
    content_hash, instrument_source, is_instrumented, InstrumentedSource, TransformOptions,
    DEFAULT_COVERAGE_VARIABLE,
};

use crate::error::{CubrirError, CubrirResult, FileAction, FileFailure};
use crate::matcher::{PatternSet, TwoWayFilter};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete instrumentation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct InstrumentOptions {
    /// Files carried into the output tree
    pub includes: PatternSet,
    /// Files left out of the output tree
    pub excludes: PatternSet,
    /// Carried files that get instrumented
    pub sources: PatternSet,
    /// Carried files that are copied verbatim
    #[serde(alias = "nonSources")]
    pub non_sources: PatternSet,
    /// Per-file transform settings
    #[serde(alias = "instrumentationOptions")]
    pub transform: TransformOptions,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            includes: PatternSet::new(["./**"]),
            excludes: PatternSet::new([
                "./node_modules/**/*",
                "./.git/**/*",
                "./reports/**/*",
                "./coverage/**/*",
                "./.idea/**/*",
                "./.vagrant/**/*",
                "tests/**/*",
                "./instrumented/**/*",
            ]),
            sources: PatternSet::new(["./*.js", "./**/*.js"]),
            non_sources: PatternSet::new(["!./**/*.js", "./Gruntfile.js"]),
            transform: TransformOptions::default(),
        }
    }
}

/// Partial options layered over the defaults; each present field replaces
/// the default wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct InstrumentOverrides {
    /// Replacement include patterns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<PatternSet>,
    /// Replacement exclude patterns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excludes: Option<PatternSet>,
    /// Replacement source patterns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<PatternSet>,
    /// Replacement non-source patterns
    #[serde(alias = "nonSources", skip_serializing_if = "Option::is_none")]
    pub non_sources: Option<PatternSet>,
    /// Whether to emit source maps
    #[serde(alias = "produceSourceMap", skip_serializing_if = "Option::is_none")]
    pub produce_source_map: Option<bool>,
    /// Global coverage key
    #[serde(alias = "coverageVariable", skip_serializing_if = "Option::is_none")]
    pub coverage_variable: Option<String>,
}

impl InstrumentOptions {
    /// Apply overrides field by field
    pub fn merged_with(mut self, overrides: &InstrumentOverrides) -> Self {
        if let Some(includes) = &overrides.includes {
            self.includes = includes.clone();
        }
        if let Some(excludes) = &overrides.excludes {
            self.excludes = excludes.clone();
        }
        if let Some(sources) = &overrides.sources {
            self.sources = sources.clone();
        }
        if let Some(non_sources) = &overrides.non_sources {
            self.non_sources = non_sources.clone();
        }
        if let Some(produce) = overrides.produce_source_map {
            self.transform.produce_source_map = produce;
        }
        if let Some(variable) = &overrides.coverage_variable {
            self.transform.coverage_variable = variable.clone();
        }
        self
    }
}

impl InstrumentOverrides {
    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn overlay(mut self, other: &InstrumentOverrides) -> Self {
        if other.includes.is_some() {
            self.includes.clone_from(&other.includes);
        }
        if other.excludes.is_some() {
            self.excludes.clone_from(&other.excludes);
        }
        if other.sources.is_some() {
            self.sources.clone_from(&other.sources);
        }
        if other.non_sources.is_some() {
            self.non_sources.clone_from(&other.non_sources);
        }
        if other.produce_source_map.is_some() {
            self.produce_source_map = other.produce_source_map;
        }
        if other.coverage_variable.is_some() {
            self.coverage_variable.clone_from(&other.coverage_variable);
        }
        self
    }
}

/// What happens to a file found in the input tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
    /// Transform and write with counters
    Instrument,
    /// Copy byte-for-byte
    Copy,
    /// Leave out of the output tree
    Skip,
}

/// Files written by a finished job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentSummary {
    /// Output paths of instrumented files
    pub instrumented: Vec<PathBuf>,
    /// Output paths of copied files
    pub copied: Vec<PathBuf>,
    /// Number of files left out
    pub skipped: usize,
}

impl InstrumentSummary {
    fn absorb(&mut self, other: InstrumentSummary) {
        self.instrumented.extend(other.instrumented);
        self.copied.extend(other.copied);
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Default)]
struct LevelOutcome {
    summary: InstrumentSummary,
    failures: Vec<FileFailure>,
}

impl LevelOutcome {
    fn absorb(&mut self, other: LevelOutcome) {
        self.summary.absorb(other.summary);
        self.failures.extend(other.failures);
    }
}

enum FileResult {
    Instrumented(PathBuf),
    Copied(PathBuf),
}

/// One input tree mirrored into one output tree
#[derive(Debug, Clone)]
pub struct InstrumentationJob {
    input: PathBuf,
    output: PathBuf,
    options: InstrumentOptions,
    carry: TwoWayFilter,
    source: TwoWayFilter,
}

impl InstrumentationJob {
    /// Prepare a job; filters are folded once up front
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: InstrumentOptions) -> Self {
        let carry = TwoWayFilter::new(&options.includes, &options.excludes);
        let source = TwoWayFilter::new(&options.sources, &options.non_sources);
        Self {
            input: input.into(),
            output: output.into(),
            options,
            carry,
            source,
        }
    }

    /// Input root
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Output root
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Effective options
    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// Decide what to do with a file under the input root
    pub fn classify(&self, file: &Path) -> FileClassification {
        if !self.carry.allows(&self.input, file) {
            FileClassification::Skip
        } else if self.source.allows(&self.input, file) {
            FileClassification::Instrument
        } else {
            FileClassification::Copy
        }
    }

    /// Walk the input tree and write the output tree.
    ///
    /// Returns an [`CubrirError::Instrumentation`] listing every failed file
    /// once all operations have settled.
    pub async fn run(self) -> CubrirResult<InstrumentSummary> {
        tracing::info!(
            input = %self.input.display(),
            output = %self.output.display(),
            "Instrumenting source tree"
        );
        let outcome = self
            .process_directory(self.input.clone(), self.output.clone())
            .await;

        if !outcome.failures.is_empty() {
            for failure in &outcome.failures {
                tracing::error!(path = %failure.path.display(), action = %failure.action, cause = %failure.cause, "File operation failed");
            }
            return Err(CubrirError::Instrumentation {
                failures: outcome.failures,
            });
        }

        tracing::info!(
            instrumented = outcome.summary.instrumented.len(),
            copied = outcome.summary.copied.len(),
            skipped = outcome.summary.skipped,
            "Instrumentation complete"
        );
        Ok(outcome.summary)
    }

    fn process_directory(&self, input_dir: PathBuf, output_dir: PathBuf) -> BoxFuture<'_, LevelOutcome> {
        async move {
            let mut outcome = LevelOutcome::default();
            let entries = match list_directory(&input_dir).await {
                Ok(entries) => entries,
                Err(failure) => {
                    outcome.failures.push(failure);
                    return outcome;
                }
            };

            let mut directories = Vec::new();
            let mut files = Vec::new();
            for entry in entries {
                let target = output_dir.join(entry.file_name().unwrap_or_default());
                // Follows symlinks, so linked directories are walked too.
                match tokio::fs::metadata(&entry).await {
                    Ok(meta) if meta.is_dir() => {
                        directories.push(self.process_directory(entry, target));
                    }
                    Ok(_) => match self.classify(&entry) {
                        FileClassification::Skip => {
                            tracing::debug!(path = %entry.display(), "Skipping excluded file");
                            outcome.summary.skipped += 1;
                        }
                        class => files.push(self.process_file(entry, target, class)),
                    },
                    Err(err) => outcome
                        .failures
                        .push(FileFailure::new(entry, FileAction::Stat, err)),
                }
            }

            let (nested, settled) = futures::join!(join_all(directories), join_all(files));
            for level in nested {
                outcome.absorb(level);
            }
            for result in settled {
                match result {
                    Ok(FileResult::Instrumented(path)) => outcome.summary.instrumented.push(path),
                    Ok(FileResult::Copied(path)) => outcome.summary.copied.push(path),
                    Err(failures) => outcome.failures.extend(failures),
                }
            }
            outcome
        }
        .boxed()
    }

    async fn process_file(
        &self,
        input: PathBuf,
        output: PathBuf,
        class: FileClassification,
    ) -> Result<FileResult, Vec<FileFailure>> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| vec![FileFailure::new(parent, FileAction::CreateDir, err)])?;
        }

        if class == FileClassification::Copy {
            tracing::debug!(path = %input.display(), "Copying file");
            return tokio::fs::copy(&input, &output)
                .await
                .map(|_| FileResult::Copied(output))
                .map_err(|err| vec![FileFailure::new(input, FileAction::Copy, err)]);
        }

        tracing::debug!(path = %input.display(), "Instrumenting file");
        let source = tokio::fs::read_to_string(&input)
            .await
            .map_err(|err| vec![FileFailure::new(&input, FileAction::Read, err)])?;
        let instrumented = instrument_source(&source, &input, &self.options.transform)
            .map_err(|err| vec![FileFailure::new(&input, FileAction::Instrument, err)])?;

        let code_write = async {
            tokio::fs::write(&output, instrumented.code.as_bytes())
                .await
                .map_err(|err| FileFailure::new(&output, FileAction::Write, err))
        };
        let map_write = async {
            match &instrumented.source_map {
                Some(map) => {
                    let mut map_path = output.clone().into_os_string();
                    map_path.push(".map");
                    let map_path = PathBuf::from(map_path);
                    tokio::fs::write(&map_path, map.as_bytes())
                        .await
                        .map_err(|err| FileFailure::new(map_path, FileAction::WriteSourceMap, err))
                }
                None => Ok(()),
            }
        };
        let failures: Vec<FileFailure> = match futures::join!(code_write, map_write) {
            (Ok(()), Ok(())) => Vec::new(),
            (code, map) => code.err().into_iter().chain(map.err()).collect(),
        };
        if failures.is_empty() {
            Ok(FileResult::Instrumented(output))
        } else {
            Err(failures)
        }
    }
}

async fn list_directory(dir: &Path) -> Result<Vec<PathBuf>, FileFailure> {
    let fail = |err: std::io::Error| FileFailure::new(dir, FileAction::ReadDir, err);
    let mut reader = tokio::fs::read_dir(dir).await.map_err(fail)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(fail)? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Instrument `input` into `output` with `overrides` layered over the
/// default options.
pub async fn instrument(
    input: impl Into<PathBuf>,
    output: impl Into<PathBuf>,
    overrides: &InstrumentOverrides,
) -> CubrirResult<InstrumentSummary> {
    let options = InstrumentOptions::default().merged_with(overrides);
    InstrumentationJob::new(input, output, options).run().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    const SIMPLE_JS: &str = "var greet = function (name) {\n  return name ? \"hi \" + name : \"hi\";\n};\ngreet(\"you\");\n";

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn tree(root: &Path) -> BTreeSet<String> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<String>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    out.insert(path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
                }
            }
        }
        let mut out = BTreeSet::new();
        if root.exists() {
            walk(root, root, &mut out);
        }
        out
    }

    fn instrumented(path: &Path) -> bool {
        is_instrumented(&std::fs::read_to_string(path).unwrap())
    }

    fn overrides_with_includes(includes: &[&str]) -> InstrumentOverrides {
        InstrumentOverrides {
            includes: Some(PatternSet::from(includes)),
            ..InstrumentOverrides::default()
        }
    }

    mod options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let options = InstrumentOptions::default();
            assert_eq!(options.includes, PatternSet::new(["./**"]));
            assert_eq!(options.excludes.len(), 8);
            assert!(options.transform.produce_source_map);
        }

        #[test]
        fn test_merge_replaces_whole_fields() {
            let overrides = InstrumentOverrides {
                excludes: Some(PatternSet::empty()),
                produce_source_map: Some(false),
                ..InstrumentOverrides::default()
            };
            let merged = InstrumentOptions::default().merged_with(&overrides);
            assert!(merged.excludes.is_empty());
            assert!(!merged.transform.produce_source_map);
            assert_eq!(merged.sources, InstrumentOptions::default().sources);
        }

        #[test]
        fn test_overlay_prefers_later_fields() {
            let base = overrides_with_includes(&["./src/**"]);
            let top = InstrumentOverrides {
                sources: Some(PatternSet::new(["./src/*.js"])),
                ..InstrumentOverrides::default()
            };
            let combined = base.overlay(&top);
            assert_eq!(combined.includes, Some(PatternSet::new(["./src/**"])));
            assert_eq!(combined.sources, Some(PatternSet::new(["./src/*.js"])));
        }

        #[test]
        fn test_overrides_accept_camel_case() {
            let parsed: InstrumentOverrides =
                serde_json::from_str(r#"{"nonSources": ["./x.js"], "produceSourceMap": false}"#)
                    .unwrap();
            assert_eq!(parsed.non_sources, Some(PatternSet::new(["./x.js"])));
            assert_eq!(parsed.produce_source_map, Some(false));
        }
    }

    mod classify_tests {
        use super::*;

        #[test]
        fn test_default_classification() {
            let job = InstrumentationJob::new("/work", "/out", InstrumentOptions::default());
            assert_eq!(
                job.classify(Path::new("/work/src/index.js")),
                FileClassification::Instrument
            );
            assert_eq!(
                job.classify(Path::new("/work/src/data.json")),
                FileClassification::Copy
            );
            assert_eq!(
                job.classify(Path::new("/work/Gruntfile.js")),
                FileClassification::Copy
            );
            assert_eq!(
                job.classify(Path::new("/work/node_modules/dep/index.js")),
                FileClassification::Skip
            );
        }
    }

    mod tree_tests {
        use super::*;

        #[tokio::test]
        async fn test_simple_tree() {
            let input = TempDir::new().unwrap();
            let output = TempDir::new().unwrap();
            write(input.path(), "src/js/index.js", SIMPLE_JS);
            write(input.path(), "src/js/nested/index.js", SIMPLE_JS);

            let summary = instrument(input.path(), output.path(), &InstrumentOverrides::default())
                .await
                .unwrap();

            assert_eq!(summary.instrumented.len(), 2);
            assert!(instrumented(&output.path().join("src/js/index.js")));
            assert!(instrumented(&output.path().join("src/js/nested/index.js")));
            assert!(output.path().join("src/js/index.js.map").exists());
        }

        #[tokio::test]
        async fn test_node_modules_excluded_but_nested_packages_kept() {
            let input = TempDir::new().unwrap();
            let output = TempDir::new().unwrap();
            write(input.path(), "src/index.js", SIMPLE_JS);
            write(input.path(), "node_modules/dependency/index.js", SIMPLE_JS);
            write(input.path(), "gpii/node_modules/sub-package/index.js", SIMPLE_JS);

            instrument(input.path(), output.path(), &overrides_with_includes(&["./**/*"]))
                .await
                .unwrap();

            let files = tree(output.path());
            assert!(files.contains("gpii/node_modules/sub-package/index.js"));
            assert!(instrumented(&output.path().join("gpii/node_modules/sub-package/index.js")));
            assert!(!files.iter().any(|f| f.starts_with("node_modules/")));
        }

        #[tokio::test]
        async fn test_non_js_files_copied_verbatim() {
            let input = TempDir::new().unwrap();
            let output = TempDir::new().unwrap();
            write(input.path(), "src/js/index.js", SIMPLE_JS);
            write(input.path(), "src/json/data.json", "{\"a\": 1}\n");
            write(input.path(), "src/txt/notes.txt", "plain text\n");
            write(input.path(), "other/ignored.js", SIMPLE_JS);

            let summary = instrument(input.path(), output.path(), &overrides_with_includes(&["./src/**/*"]))
                .await
                .unwrap();

            assert_eq!(summary.copied.len(), 2);
            assert_eq!(
                std::fs::read_to_string(output.path().join("src/json/data.json")).unwrap(),
                "{\"a\": 1}\n"
            );
            assert_eq!(
                std::fs::read_to_string(output.path().join("src/txt/notes.txt")).unwrap(),
                "plain text\n"
            );
            assert!(instrumented(&output.path().join("src/js/index.js")));
            assert!(!tree(output.path()).contains("other/ignored.js"));
        }

        #[tokio::test]
        async fn test_non_js_files_left_out_when_not_included() {
            let input = TempDir::new().unwrap();
            let output = TempDir::new().unwrap();
            write(input.path(), "src/js/index.js", SIMPLE_JS);
            write(input.path(), "src/json/data.json", "{}\n");
            write(input.path(), "src/txt/notes.txt", "text\n");

            let overrides = InstrumentOverrides {
                produce_source_map: Some(false),
                ..overrides_with_includes(&["./src/**/*.js"])
            };
            instrument(input.path(), output.path(), &overrides).await.unwrap();

            let files: Vec<String> = tree(output.path()).into_iter().collect();
            assert_eq!(files, vec!["src/js/index.js".to_string()]);
        }

        #[tokio::test]
        async fn test_failures_collected_after_all_files_settle() {
            let input = TempDir::new().unwrap();
            let output = TempDir::new().unwrap();
            write(input.path(), "a/good.js", SIMPLE_JS);
            write(input.path(), "a/bad.js", "function (");
            write(input.path(), "b/worse.js", "var = ;");
            write(input.path(), "b/readme.txt", "hello\n");

            let err = instrument(input.path(), output.path(), &InstrumentOverrides::default())
                .await
                .unwrap_err();

            let CubrirError::Instrumentation { failures } = err else {
                panic!("expected instrumentation error, got {err}");
            };
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|f| f.action == FileAction::Instrument));
            // Siblings of the failed files still completed.
            assert!(instrumented(&output.path().join("a/good.js")));
            assert!(output.path().join("b/readme.txt").exists());
        }

        #[tokio::test]
        async fn test_missing_input_reports_read_dir_failure() {
            let output = TempDir::new().unwrap();
            let err = instrument("/definitely/not/here", output.path(), &InstrumentOverrides::default())
                .await
                .unwrap_err();
            let CubrirError::Instrumentation { failures } = err else {
                panic!("expected instrumentation error");
            };
            assert_eq!(failures[0].action, FileAction::ReadDir);
        }

        #[tokio::test]
        async fn test_empty_tree_creates_nothing() {
            let input = TempDir::new().unwrap();
            let output = TempDir::new().unwrap();
            let target = output.path().join("mirror");
            let summary = instrument(input.path(), &target, &InstrumentOverrides::default())
                .await
                .unwrap();
            assert_eq!(summary, InstrumentSummary::default());
            assert!(!target.exists());
        }
    }
}
