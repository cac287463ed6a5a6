//! Removal of per-run directories.
//!
//! Cleanup never fails a lifecycle chain: every problem is logged and
//! recorded in the returned [`CleanupReport`].

use super::state::CleanupStage;
use crate::config::{CleanupScope, HarnessConfig};
use crate::error::{FileAction, FileFailure};
use std::path::{Path, PathBuf};

/// Prefix of the scratch directories browsers leave in the temp root
pub const RUNNER_TEMP_PREFIX: &str = "Temp-";

/// A directory removed by a cleanup pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTarget {
    /// Name for logging
    pub name: &'static str,
    /// Directory to remove
    pub path: PathBuf,
    /// Also sweep runner scratch directories from the temp root
    pub runner_content: bool,
}

/// Directories covered by `scope` for `config`, in removal order
pub fn cleanup_targets(config: &HarnessConfig, scope: CleanupScope) -> Vec<CleanupTarget> {
    let mut targets = Vec::new();
    if scope == CleanupScope::Nothing {
        return targets;
    }
    targets.push(CleanupTarget {
        name: "runner",
        path: config.runner_dir(),
        runner_content: true,
    });
    if matches!(scope, CleanupScope::EverythingButCoverage | CleanupScope::Everything) {
        targets.push(CleanupTarget {
            name: "instrumented",
            path: config.instrumented_source_dir(),
            runner_content: false,
        });
    }
    if scope == CleanupScope::Everything {
        targets.push(CleanupTarget {
            name: "coverage",
            path: config.coverage_dir(),
            runner_content: false,
        });
    }
    targets
}

/// What a cleanup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Paths removed
    pub removed: Vec<PathBuf>,
    /// Targets that did not exist
    pub missing: Vec<PathBuf>,
    /// Removals that failed
    pub failures: Vec<FileFailure>,
}

impl CleanupReport {
    /// Whether every removal succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Remove `targets` one after another, sweeping `Temp-*` entries from
/// `temp_root` for runner content.
pub async fn cleanup(stage: CleanupStage, targets: &[CleanupTarget], temp_root: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();
    for target in targets {
        remove_path(target.name, &target.path, &mut report).await;
        if target.runner_content {
            for leftover in runner_leftovers(temp_root).await {
                remove_path("runner scratch", &leftover, &mut report).await;
            }
        }
    }
    if report.is_clean() {
        tracing::info!(stage = %stage, removed = report.removed.len(), "Cleanup completed");
    } else {
        tracing::warn!(stage = %stage, failures = report.failures.len(), "Cleanup finished with errors");
    }
    report
}

async fn runner_leftovers(temp_root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut reader = match tokio::fs::read_dir(temp_root).await {
        Ok(reader) => reader,
        Err(err) => {
            tracing::warn!(path = %temp_root.display(), error = %err, "Cannot scan for runner leftovers");
            return found;
        }
    };
    while let Ok(Some(entry)) = reader.next_entry().await {
        let name = entry.file_name();
        let is_leftover = name
            .to_str()
            .and_then(|name| name.strip_prefix(RUNNER_TEMP_PREFIX))
            .is_some_and(|rest| !rest.is_empty());
        if is_leftover {
            found.push(entry.path());
        }
    }
    found.sort();
    found
}

async fn remove_path(name: &str, path: &Path, report: &mut CleanupReport) {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(target_name = name, path = %path.display(), "No content to remove");
            report.missing.push(path.to_path_buf());
            return;
        }
        Err(err) => {
            tracing::warn!(target_name = name, path = %path.display(), error = %err, "Cannot inspect cleanup target");
            report.failures.push(FileFailure::new(path, FileAction::Stat, err));
            return;
        }
    };

    let removal = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match removal {
        Ok(()) => {
            tracing::debug!(target_name = name, path = %path.display(), "Removed content");
            report.removed.push(path.to_path_buf());
        }
        Err(err) => {
            tracing::warn!(target_name = name, path = %path.display(), error = %err, "Error removing content");
            report.failures.push(FileFailure::new(path, FileAction::Remove, err));
        }
    }
}
