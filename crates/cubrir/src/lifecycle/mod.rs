//! Test-runner lifecycle: fixtures, bounded waits, cleanup and the
//! orchestrator that ties them to the runner's start and exit hooks.

mod cleanup;
mod event;
mod fixture;
mod guard;
mod orchestrator;
mod state;

pub use cleanup::{cleanup, cleanup_targets, CleanupReport, CleanupTarget, RUNNER_TEMP_PREFIX};
pub use event::{wait_all_with_timeout, wait_with_timeout, EventTrigger, SingleUseEvent, WaitOutcome};
pub use fixture::{Fixture, FixtureManager, FixtureState, SimpleFixture};
pub use guard::{CompletionGuard, HookCallback};
pub use orchestrator::{LifecycleHooks, Orchestrator, Phase, PhaseOutcome, PhaseRecord};
pub use state::{CleanupStage, LifecycleState};
