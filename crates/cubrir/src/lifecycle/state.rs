//! Lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two cleanup passes is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStage {
    /// Before instrumentation
    Initial,
    /// After reporting
    Final,
}

impl fmt::Display for CleanupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Final => write!(f, "final"),
        }
    }
}

/// Where a harness is in its start/exit chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing has run yet.
    #[default]
    Idle,
    /// Removing leftovers from earlier runs.
    Cleaning(CleanupStage),
    /// Instrumenting source directories.
    Instrumenting,
    /// Asking fixtures to start.
    ConstructingFixtures,
    /// Waiting, bounded, for every fixture to report ready.
    AwaitingFixtureReady,
    /// Tests are running in the browser.
    Running,
    /// Asking fixtures to stop.
    StoppingFixtures,
    /// Waiting, bounded, for every fixture to report stopped.
    AwaitingFixtureStopped,
    /// Merging coverage and writing reports.
    Reporting,
    /// Exit chain finished.
    Done,
}

impl LifecycleState {
    /// Whether the start chain has completed
    pub fn is_started(self) -> bool {
        !matches!(
            self,
            Self::Idle
                | Self::Cleaning(CleanupStage::Initial)
                | Self::Instrumenting
                | Self::ConstructingFixtures
                | Self::AwaitingFixtureReady
        )
    }

    /// Whether the exit chain has completed
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Cleaning(stage) => write!(f, "{stage}_cleanup"),
            Self::Instrumenting => write!(f, "instrumenting"),
            Self::ConstructingFixtures => write!(f, "constructing_fixtures"),
            Self::AwaitingFixtureReady => write!(f, "awaiting_fixture_ready"),
            Self::Running => write!(f, "running"),
            Self::StoppingFixtures => write!(f, "stopping_fixtures"),
            Self::AwaitingFixtureStopped => write!(f, "awaiting_fixture_stopped"),
            Self::Reporting => write!(f, "reporting"),
            Self::Done => write!(f, "done"),
        }
    }
}
