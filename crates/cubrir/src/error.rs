//! Result and error types for Cubrir.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Cubrir operations
pub type CubrirResult<T> = Result<T, CubrirError>;

/// File-level action that can fail while walking an instrumentation tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Listing a directory
    ReadDir,
    /// Resolving entry metadata
    Stat,
    /// Creating an output directory
    CreateDir,
    /// Reading a source file
    Read,
    /// Transforming a source file
    Instrument,
    /// Writing instrumented output
    Write,
    /// Writing a source map sibling
    WriteSourceMap,
    /// Copying a non-source file verbatim
    Copy,
    /// Removing a per-run directory
    Remove,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::ReadDir => "read directory",
            Self::Stat => "stat",
            Self::CreateDir => "create directory",
            Self::Read => "read",
            Self::Instrument => "instrument",
            Self::Write => "write",
            Self::WriteSourceMap => "write source map for",
            Self::Copy => "copy",
            Self::Remove => "remove",
        };
        f.write_str(verb)
    }
}

/// A single failed file operation, kept so the cause stays attributable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not {action} {}: {cause}", .path.display())]
pub struct FileFailure {
    /// Path the operation acted on
    pub path: PathBuf,
    /// What was being attempted
    pub action: FileAction,
    /// Underlying cause
    pub cause: String,
}

impl FileFailure {
    /// Create a failure record
    pub fn new(path: impl Into<PathBuf>, action: FileAction, cause: impl ToString) -> Self {
        Self {
            path: path.into(),
            action,
            cause: cause.to_string(),
        }
    }
}

fn describe_failures(failures: &[FileFailure]) -> String {
    match failures {
        [] => "no failures recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

/// Errors that can occur in Cubrir
#[derive(Debug, Error)]
pub enum CubrirError {
    /// JavaScript source could not be parsed
    #[error("Failed to parse {}: {message}", .path.display())]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Parser diagnostics
        message: String,
    },

    /// One or more files in an instrumentation tree failed
    #[error("Instrumentation failed for {} file(s): {}", .failures.len(), describe_failures(.failures))]
    Instrumentation {
        /// Every failed operation, in completion order
        failures: Vec<FileFailure>,
    },

    /// Report generation failed
    #[error("Report generation failed: {message}")]
    Report {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Fixture lifecycle error
    #[error("Fixture {name} failed: {message}")]
    Fixture {
        /// Fixture name
        name: String,
        /// Error message
        message: String,
    },

    /// A lifecycle phase panicked
    #[error("Phase {phase} panicked: {message}")]
    PhasePanicked {
        /// Phase that was running
        phase: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl CubrirError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a report error
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }

    /// Create a fixture error
    pub fn fixture(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fixture {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_failure_display() {
        let failure = FileFailure::new("/src/a.js", FileAction::Instrument, "unexpected token");
        assert_eq!(
            failure.to_string(),
            "could not instrument /src/a.js: unexpected token"
        );
    }

    #[test]
    fn test_instrumentation_error_summarizes_failures() {
        let err = CubrirError::Instrumentation {
            failures: vec![
                FileFailure::new("/a.js", FileAction::Read, "denied"),
                FileFailure::new("/b.js", FileAction::Write, "full"),
                FileFailure::new("/c.js", FileAction::Copy, "gone"),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("Instrumentation failed for 3 file(s)"));
        assert!(text.contains("could not read /a.js: denied"));
        assert!(text.contains("(and 2 more)"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CubrirError = io.into();
        assert!(matches!(err, CubrirError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_helper_constructors() {
        assert_eq!(
            CubrirError::config("bad port").to_string(),
            "Invalid configuration: bad port"
        );
        assert_eq!(
            CubrirError::fixture("coverage-server", "bind failed").to_string(),
            "Fixture coverage-server failed: bind failed"
        );
        assert_eq!(
            CubrirError::Timeout { ms: 30000 }.to_string(),
            "Operation timed out after 30000ms"
        );
    }
}
