//! Cubrir: browser test coverage orchestration
//!
//! Cubrir (Spanish: "to cover") instruments JavaScript source trees, serves
//! them to a browser test runner, collects the coverage each browser
//! uploads and merges it into reports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    CUBRIR Architecture                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Source     │    │ Instrument │    │ Coverage   │            │
//! │   │ Dirs (JS)  │───►│ (oxc AST)  │───►│ Server     │───► browser│
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │         ▲                                   │ uploads            │
//! │         │ on_start / on_exit                ▼                    │
//! │   ┌────────────┐                     ┌────────────┐             │
//! │   │ Lifecycle  │────────────────────►│ Reporter   │             │
//! │   │ Orchestr.  │                     │ html/lcov  │             │
//! │   └────────────┘                     └────────────┘             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP side (coverage server, CLI) lives in the `cubridor` crate.

#![warn(missing_docs)]

pub mod config;
pub mod coverage;
pub mod error;
pub mod instrument;
pub mod lifecycle;
pub mod matcher;
pub mod paths;
pub mod report;
pub mod runner_options;

pub use config::{CleanupPlan, CleanupScope, CoverageMode, HarnessConfig, HarnessConfigBuilder};
pub use coverage::{CoverageMap, CoverageTotals, FileCoverage, FileSummary};
pub use error::{CubrirError, CubrirResult, FileAction, FileFailure};
pub use instrument::{
    instrument, instrument_source, is_instrumented, InstrumentOptions, InstrumentOverrides,
    InstrumentSummary, InstrumentationJob, TransformOptions, DEFAULT_COVERAGE_VARIABLE,
};
pub use lifecycle::{
    CompletionGuard, Fixture, FixtureManager, HookCallback, LifecycleHooks, LifecycleState,
    Orchestrator, Phase, PhaseOutcome, PhaseRecord, SimpleFixture, SingleUseEvent,
};
pub use matcher::{allowed_by_two_way_filter, PatternSet, TwoWayFilter};
pub use paths::{DirDef, DirSpec, PathResolver};
pub use report::{report, LoadedCoverage, ReportFormat, ReportOutput, Reporter};
pub use runner_options::{RunnerSettings, TestRunnerOptions};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod error_tests {
        use super::*;

        #[test]
        fn test_timeout_display() {
            let err = CubrirError::Timeout { ms: 5000 };
            assert!(err.to_string().contains("5000"));
        }
    }

    #[test]
    fn test_version_matches_manifest() {
        assert!(!VERSION.is_empty());
    }
}
