//! Exactly-once completion callbacks.

use std::fmt;

/// Callback handed in by the test runner for a lifecycle hook
pub type HookCallback = Box<dyn FnOnce() + Send + 'static>;

/// Owns a hook's completion callback and guarantees it runs exactly once.
///
/// [`fire`](Self::fire) consumes the guard; if the guard is dropped first
/// (early return, error, panic unwinding through the chain) the callback
/// runs from `Drop`.
pub struct CompletionGuard {
    hook: &'static str,
    callback: Option<HookCallback>,
}

impl fmt::Debug for CompletionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGuard")
            .field("hook", &self.hook)
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

impl CompletionGuard {
    /// Wrap `callback` for the named hook
    pub fn new(hook: &'static str, callback: HookCallback) -> Self {
        Self {
            hook,
            callback: Some(callback),
        }
    }

    /// Hook this guard belongs to
    pub fn hook(&self) -> &'static str {
        self.hook
    }

    /// Whether the callback still has to run
    pub fn is_pending(&self) -> bool {
        self.callback.is_some()
    }

    /// Run the callback now
    pub fn fire(mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::debug!(hook = self.hook, "Completing hook");
            callback();
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!(hook = self.hook, "Hook chain ended early, completing from guard");
            callback();
        }
    }
}
