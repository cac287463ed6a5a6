//! Long-lived fixtures (coverage server and friends) that run alongside a
//! browser test run.
//!
//! A fixture starts asynchronously: [`Fixture::construct`] kicks off startup
//! and hands back an event that fires once the fixture is ready. Stopping
//! works the same way. The orchestrator bounds both waits with a timeout.

use super::event::SingleUseEvent;
use crate::error::CubrirResult;
use std::fmt;

/// A fixture with asynchronous start-up and shut-down.
///
/// # Example
///
/// ```ignore
/// struct Server { trigger: Option<EventTrigger> }
///
/// impl Fixture for Server {
///     fn name(&self) -> &str { "server" }
///
///     fn construct(&mut self) -> CubrirResult<SingleUseEvent> {
///         let (ready, event) = SingleUseEvent::pair("server-ready");
///         tokio::spawn(async move { /* bind */ ready.fire(); });
///         Ok(event)
///     }
///
///     fn stop(&mut self) -> CubrirResult<SingleUseEvent> {
///         Ok(SingleUseEvent::fired("server-stopped"))
///     }
/// }
/// ```
pub trait Fixture: Send + Sync {
    /// Fixture name for logging.
    fn name(&self) -> &str;

    /// Start the fixture. The returned event fires once it is ready.
    fn construct(&mut self) -> CubrirResult<SingleUseEvent>;

    /// Stop the fixture. The returned event fires once it has stopped.
    fn stop(&mut self) -> CubrirResult<SingleUseEvent>;

    /// Priority (higher = constructed first, stopped last).
    fn priority(&self) -> i32 {
        0
    }
}

/// State of a fixture in the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    /// Registered, not yet constructed.
    Registered,
    /// Construction started; readiness may still be pending.
    Constructed,
    /// Stop requested.
    Stopped,
    /// Construction or stop returned an error.
    Failed,
}

struct FixtureEntry {
    fixture: Box<dyn Fixture>,
    state: FixtureState,
}

/// Owns the fixtures of one harness and starts/stops them in priority order.
#[derive(Default)]
pub struct FixtureManager {
    fixtures: Vec<FixtureEntry>,
}

impl fmt::Debug for FixtureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureManager")
            .field(
                "fixtures",
                &self
                    .fixtures
                    .iter()
                    .map(|entry| (entry.fixture.name().to_string(), entry.state))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FixtureManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixture. Fixtures keep priority order, then registration order.
    pub fn register<F: Fixture + 'static>(&mut self, fixture: F) {
        self.register_boxed(Box::new(fixture));
    }

    /// Register an already boxed fixture.
    pub fn register_boxed(&mut self, fixture: Box<dyn Fixture>) {
        let priority = fixture.priority();
        let index = self
            .fixtures
            .iter()
            .position(|entry| entry.fixture.priority() < priority)
            .unwrap_or(self.fixtures.len());
        self.fixtures.insert(
            index,
            FixtureEntry {
                fixture,
                state: FixtureState::Registered,
            },
        );
    }

    /// Number of registered fixtures.
    #[must_use]
    pub fn count(&self) -> usize {
        self.fixtures.len()
    }

    /// Names and states, in construction order.
    #[must_use]
    pub fn states(&self) -> Vec<(String, FixtureState)> {
        self.fixtures
            .iter()
            .map(|entry| (entry.fixture.name().to_string(), entry.state))
            .collect()
    }

    /// Construct every registered fixture, highest priority first.
    ///
    /// Returns the readiness events of fixtures that started. A fixture
    /// whose construction fails is logged, marked failed and skipped.
    pub fn construct_all(&mut self) -> Vec<SingleUseEvent> {
        let mut events = Vec::with_capacity(self.fixtures.len());
        for entry in &mut self.fixtures {
            if entry.state != FixtureState::Registered && entry.state != FixtureState::Stopped {
                continue;
            }
            let name = entry.fixture.name().to_string();
            tracing::info!(fixture = %name, "Constructing fixture");
            match entry.fixture.construct() {
                Ok(event) => {
                    entry.state = FixtureState::Constructed;
                    events.push(event);
                }
                Err(err) => {
                    tracing::error!(fixture = %name, error = %err, "Fixture construction failed");
                    entry.state = FixtureState::Failed;
                }
            }
        }
        events
    }

    /// Stop every constructed fixture, in reverse construction order.
    ///
    /// Fixtures that never started are skipped, so calling this twice is
    /// harmless.
    pub fn stop_all(&mut self) -> Vec<SingleUseEvent> {
        let mut events = Vec::new();
        for entry in self.fixtures.iter_mut().rev() {
            if entry.state != FixtureState::Constructed {
                continue;
            }
            let name = entry.fixture.name().to_string();
            tracing::info!(fixture = %name, "Stopping fixture");
            match entry.fixture.stop() {
                Ok(event) => {
                    entry.state = FixtureState::Stopped;
                    events.push(event);
                }
                Err(err) => {
                    tracing::error!(fixture = %name, error = %err, "Fixture stop failed");
                    entry.state = FixtureState::Failed;
                }
            }
        }
        events
    }
}

/// Fixture built from closures, handy for tests and simple in-process
/// services. Construction and stop signal readiness immediately.
pub struct SimpleFixture {
    name: String,
    priority: i32,
    on_construct: Option<Box<dyn FnMut() -> CubrirResult<()> + Send + Sync>>,
    on_stop: Option<Box<dyn FnMut() -> CubrirResult<()> + Send + Sync>>,
}

impl fmt::Debug for SimpleFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleFixture")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

impl SimpleFixture {
    /// Create a fixture with no behaviour.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            on_construct: None,
            on_stop: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Run `f` on construction.
    #[must_use]
    pub fn on_construct<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> CubrirResult<()> + Send + Sync + 'static,
    {
        self.on_construct = Some(Box::new(f));
        self
    }

    /// Run `f` on stop.
    #[must_use]
    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> CubrirResult<()> + Send + Sync + 'static,
    {
        self.on_stop = Some(Box::new(f));
        self
    }
}

impl Fixture for SimpleFixture {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(&mut self) -> CubrirResult<SingleUseEvent> {
        if let Some(f) = self.on_construct.as_mut() {
            f()?;
        }
        Ok(SingleUseEvent::fired(format!("{}-ready", self.name)))
    }

    fn stop(&mut self) -> CubrirResult<SingleUseEvent> {
        if let Some(f) = self.on_stop.as_mut() {
            f()?;
        }
        Ok(SingleUseEvent::fired(format!("{}-stopped", self.name)))
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
