//! Start and exit chains driven by the test runner's lifecycle hooks.
//!
//! ```text
//! on_start: initial cleanup -> instrument -> construct fixtures -> wait -> callback
//! on_exit:  stop fixtures -> wait -> report -> final cleanup -> callback
//! ```
//!
//! Every phase is best effort. Errors, timeouts and panics are logged and
//! recorded as a [`PhaseRecord`], and the chain moves on. The runner's
//! callback is owned by a [`CompletionGuard`] so it fires exactly once.

use super::cleanup::{cleanup, cleanup_targets};
use super::event::{wait_all_with_timeout, WaitOutcome};
use super::fixture::{Fixture, FixtureManager};
use super::guard::{CompletionGuard, HookCallback};
use super::state::{CleanupStage, LifecycleState};
use crate::config::{CleanupScope, HarnessConfig};
use crate::error::{CubrirError, CubrirResult};
use crate::instrument::InstrumentationJob;
use crate::report::{ReportOutput, Reporter};
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Hooks a browser test runner calls around a run.
///
/// Each hook receives the runner's data and a callback that tells the
/// runner to proceed. Implementations must fire the callback exactly once.
#[async_trait]
pub trait LifecycleHooks: Send {
    /// Called before any browser launches
    async fn on_start(&mut self, data: Value, callback: HookCallback);

    /// Called after every browser has finished
    async fn on_exit(&mut self, data: Value, callback: HookCallback);
}

/// A step of the start or exit chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Cleanup before instrumentation
    InitialCleanup,
    /// Instrumenting source directories
    Instrumentation,
    /// Starting fixtures
    ConstructFixtures,
    /// Stopping fixtures
    StopFixtures,
    /// Writing reports
    Reporting,
    /// Cleanup after reporting
    FinalCleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialCleanup => write!(f, "initial_cleanup"),
            Self::Instrumentation => write!(f, "instrumentation"),
            Self::ConstructFixtures => write!(f, "construct_fixtures"),
            Self::StopFixtures => write!(f, "stop_fixtures"),
            Self::Reporting => write!(f, "reporting"),
            Self::FinalCleanup => write!(f, "final_cleanup"),
        }
    }
}

/// How a phase ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Finished normally
    Completed,
    /// Not needed in this mode
    Skipped,
    /// A bounded wait expired
    TimedOut,
    /// Returned an error or panicked
    Failed(String),
}

impl PhaseOutcome {
    /// Whether the phase did its work
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// One finished phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    /// Which phase
    pub phase: Phase,
    /// How it ended
    pub outcome: PhaseOutcome,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run one phase, turning errors and panics into a record.
async fn guarded<F>(phase: Phase, work: F) -> PhaseRecord
where
    F: Future<Output = CubrirResult<PhaseOutcome>> + Send,
{
    let started = Instant::now();
    tracing::debug!(phase = %phase, "Phase starting");
    let outcome = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            tracing::error!(phase = %phase, error = %err, "Phase failed");
            PhaseOutcome::Failed(err.to_string())
        }
        Err(payload) => {
            let err = CubrirError::PhasePanicked {
                phase: phase.to_string(),
                message: panic_message(payload.as_ref()),
            };
            tracing::error!(phase = %phase, error = %err, "Phase panicked");
            PhaseOutcome::Failed(err.to_string())
        }
    };
    let elapsed = started.elapsed();
    match &outcome {
        PhaseOutcome::TimedOut => {
            tracing::warn!(phase = %phase, "Phase timed out, continuing");
        }
        other => {
            tracing::info!(phase = %phase, outcome = ?other, elapsed_ms = elapsed.as_millis() as u64, "Phase finished");
        }
    }
    PhaseRecord {
        phase,
        outcome,
        elapsed,
    }
}

fn wait_outcome(what: &str, outcome: WaitOutcome, timeout: Duration) -> PhaseOutcome {
    match outcome {
        WaitOutcome::Fired => PhaseOutcome::Completed,
        WaitOutcome::TimedOut => {
            let err = CubrirError::Timeout {
                ms: timeout.as_millis() as u64,
            };
            tracing::warn!(error = %err, "Gave up waiting for {what}");
            PhaseOutcome::TimedOut
        }
        WaitOutcome::Abandoned => PhaseOutcome::Failed(format!("{what} event abandoned")),
    }
}

fn advance(state: &mut LifecycleState, next: LifecycleState) {
    tracing::debug!(from = %state, to = %next, "Lifecycle transition");
    *state = next;
}

/// Drives one coverage-enabled test run.
pub struct Orchestrator {
    config: HarnessConfig,
    fixtures: FixtureManager,
    state: LifecycleState,
    history: Vec<PhaseRecord>,
    last_report: Option<ReportOutput>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("run_id", &self.config.run_id)
            .field("state", &self.state)
            .field("fixtures", &self.fixtures)
            .field("phases", &self.history.len())
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator with no fixtures
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            fixtures: FixtureManager::new(),
            state: LifecycleState::Idle,
            history: Vec::new(),
            last_report: None,
        }
    }

    /// Add a fixture
    #[must_use]
    pub fn with_fixture<F: Fixture + 'static>(mut self, fixture: F) -> Self {
        self.fixtures.register(fixture);
        self
    }

    /// Add a boxed fixture
    pub fn register_fixture(&mut self, fixture: Box<dyn Fixture>) {
        self.fixtures.register_boxed(fixture);
    }

    /// Run configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every phase run so far, in order
    pub fn history(&self) -> &[PhaseRecord] {
        &self.history
    }

    /// Output of the last successful reporting phase
    pub fn last_report(&self) -> Option<&ReportOutput> {
        self.last_report.as_ref()
    }

    fn transition(&mut self, next: LifecycleState) {
        advance(&mut self.state, next);
    }

    fn record(&mut self, record: PhaseRecord) -> PhaseRecord {
        self.history.push(record.clone());
        record
    }

    async fn cleanup_phase(&mut self, stage: CleanupStage, scope: CleanupScope) -> PhaseRecord {
        self.transition(LifecycleState::Cleaning(stage));
        let phase = match stage {
            CleanupStage::Initial => Phase::InitialCleanup,
            CleanupStage::Final => Phase::FinalCleanup,
        };
        let targets = cleanup_targets(&self.config, scope);
        let temp_root = self.config.temp_root.clone();
        let record = guarded(phase, async move {
            if targets.is_empty() {
                return Ok(PhaseOutcome::Skipped);
            }
            let report = cleanup(stage, &targets, &temp_root).await;
            Ok(match report.failures.first() {
                None => PhaseOutcome::Completed,
                Some(first) => PhaseOutcome::Failed(first.to_string()),
            })
        })
        .await;
        self.record(record)
    }

    async fn instrumentation_phase(&mut self) -> PhaseRecord {
        self.transition(LifecycleState::Instrumenting);
        let config = &self.config;
        let record = guarded(Phase::Instrumentation, async move {
            if !config.mode.instruments() {
                return Ok(PhaseOutcome::Skipped);
            }
            let resolver = config.resolver();
            let root = config.instrumented_source_dir();
            let options = config.instrument_options();
            let jobs = config.source_dirs.values().map(|def| {
                InstrumentationJob::new(
                    resolver.content_path(def),
                    resolver.instrumented_path(&root, def),
                    options.clone(),
                )
                .run()
            });
            let mut failures = Vec::new();
            for result in join_all(jobs).await {
                match result {
                    Ok(_) => {}
                    Err(CubrirError::Instrumentation { failures: files }) => failures.extend(files),
                    Err(other) => return Err(other),
                }
            }
            if failures.is_empty() {
                Ok(PhaseOutcome::Completed)
            } else {
                Err(CubrirError::Instrumentation { failures })
            }
        })
        .await;
        self.record(record)
    }

    async fn construct_phase(&mut self) -> PhaseRecord {
        self.transition(LifecycleState::ConstructingFixtures);
        let timeout = self.config.wrapped_event_timeout();
        let fixtures = &mut self.fixtures;
        let state = &mut self.state;
        let record = guarded(Phase::ConstructFixtures, async move {
            let events = fixtures.construct_all();
            advance(state, LifecycleState::AwaitingFixtureReady);
            let outcome = wait_all_with_timeout(events, timeout).await;
            Ok(wait_outcome("fixtures constructed", outcome, timeout))
        })
        .await;
        self.record(record)
    }

    async fn stop_phase(&mut self) -> PhaseRecord {
        self.transition(LifecycleState::StoppingFixtures);
        let timeout = self.config.wrapped_event_timeout();
        let fixtures = &mut self.fixtures;
        let state = &mut self.state;
        let record = guarded(Phase::StopFixtures, async move {
            let events = fixtures.stop_all();
            if events.is_empty() {
                return Ok(PhaseOutcome::Skipped);
            }
            advance(state, LifecycleState::AwaitingFixtureStopped);
            let outcome = wait_all_with_timeout(events, timeout).await;
            Ok(wait_outcome("fixtures stopped", outcome, timeout))
        })
        .await;
        self.record(record)
    }

    async fn report_phase(&mut self, started: bool) -> PhaseRecord {
        self.transition(LifecycleState::Reporting);
        let config = &self.config;
        let mut produced = None;
        let slot = &mut produced;
        let record = guarded(Phase::Reporting, async move {
            if !started || !config.mode.reports() {
                return Ok(PhaseOutcome::Skipped);
            }
            let reporter = Reporter::new(
                config.coverage_dir(),
                config.reports_dir(),
                config.reports.clone(),
            );
            *slot = Some(reporter.generate().await?);
            Ok(PhaseOutcome::Completed)
        })
        .await;
        if produced.is_some() {
            self.last_report = produced;
        }
        self.record(record)
    }

    /// Run the start chain. Does nothing if the chain already ran.
    pub async fn start(&mut self) -> Vec<PhaseRecord> {
        if self.state != LifecycleState::Idle {
            tracing::warn!(state = %self.state, "Start requested twice, ignoring");
            return Vec::new();
        }
        tracing::info!(run_id = %self.config.run_id, mode = ?self.config.mode, "Starting coverage run");
        let plan = self.config.cleanup_plan();
        let records = vec![
            self.cleanup_phase(CleanupStage::Initial, plan.initial).await,
            self.instrumentation_phase().await,
            self.construct_phase().await,
        ];
        self.transition(LifecycleState::Running);
        records
    }

    /// Run the exit chain. Does nothing if the chain already ran.
    ///
    /// Without a completed start chain no tests ran, so reporting is skipped
    /// and only fixtures and cleanup are handled.
    pub async fn exit(&mut self) -> Vec<PhaseRecord> {
        if self.state.is_done() {
            tracing::warn!("Exit requested twice, ignoring");
            return Vec::new();
        }
        let started = self.state.is_started();
        if !started {
            tracing::warn!(state = %self.state, "Exit requested before start finished, skipping reports");
        }
        let plan = self.config.cleanup_plan();
        let records = vec![
            self.stop_phase().await,
            self.report_phase(started).await,
            self.cleanup_phase(CleanupStage::Final, plan.final_pass).await,
        ];
        self.transition(LifecycleState::Done);
        tracing::info!(run_id = %self.config.run_id, "Coverage run finished");
        records
    }
}

#[async_trait]
impl LifecycleHooks for Orchestrator {
    async fn on_start(&mut self, data: Value, callback: HookCallback) {
        let guard = CompletionGuard::new("on_start", callback);
        tracing::debug!(data = %data, "Runner start hook");
        self.start().await;
        guard.fire();
    }

    async fn on_exit(&mut self, data: Value, callback: HookCallback) {
        let guard = CompletionGuard::new("on_exit", callback);
        tracing::debug!(data = %data, "Runner exit hook");
        self.exit().await;
        guard.fire();
    }
}
