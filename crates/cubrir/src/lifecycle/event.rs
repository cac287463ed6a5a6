//! Single-use readiness events and bounded waits on them.

use futures::future::join_all;
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// Firing half of a [`SingleUseEvent`]
#[derive(Debug)]
pub struct EventTrigger {
    name: String,
    sender: oneshot::Sender<()>,
}

impl EventTrigger {
    /// Fire the event. Returns false when nobody is waiting any more.
    pub fn fire(self) -> bool {
        tracing::trace!(event = %self.name, "Event fired");
        self.sender.send(()).is_ok()
    }
}

/// Waiting half of a one-shot event such as "fixture ready"
pub struct SingleUseEvent {
    name: String,
    receiver: oneshot::Receiver<()>,
}

impl fmt::Debug for SingleUseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleUseEvent")
            .field("name", &self.name)
            .finish()
    }
}

impl SingleUseEvent {
    /// Create a connected trigger/event pair
    pub fn pair(name: impl Into<String>) -> (EventTrigger, SingleUseEvent) {
        let name = name.into();
        let (sender, receiver) = oneshot::channel();
        (
            EventTrigger {
                name: name.clone(),
                sender,
            },
            SingleUseEvent { name, receiver },
        )
    }

    /// An event that has already fired
    pub fn fired(name: impl Into<String>) -> SingleUseEvent {
        let (trigger, event) = Self::pair(name);
        trigger.fire();
        event
    }

    /// Event name, for logging
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How a bounded wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every event fired in time
    Fired,
    /// The timeout elapsed first
    TimedOut,
    /// A trigger was dropped without firing
    Abandoned,
}

/// Wait for `event`, giving up after `timeout`.
///
/// A timeout is logged and reported, never an error: lifecycle chains carry
/// on regardless.
pub async fn wait_with_timeout(event: SingleUseEvent, timeout: Duration) -> WaitOutcome {
    let SingleUseEvent { name, receiver } = event;
    match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(())) => WaitOutcome::Fired,
        Ok(Err(_)) => {
            tracing::warn!(event = %name, "Event trigger dropped before firing");
            WaitOutcome::Abandoned
        }
        Err(_) => {
            tracing::warn!(event = %name, timeout_ms = timeout.as_millis() as u64, "Timed out waiting for event");
            WaitOutcome::TimedOut
        }
    }
}

/// Wait for every event under one shared timeout
pub async fn wait_all_with_timeout(events: Vec<SingleUseEvent>, timeout: Duration) -> WaitOutcome {
    if events.is_empty() {
        return WaitOutcome::Fired;
    }
    let names: Vec<String> = events.iter().map(|event| event.name.clone()).collect();
    let receivers = events.into_iter().map(|event| event.receiver);
    match tokio::time::timeout(timeout, join_all(receivers)).await {
        Ok(results) if results.iter().all(Result::is_ok) => WaitOutcome::Fired,
        Ok(_) => {
            tracing::warn!(events = ?names, "Event trigger dropped before firing");
            WaitOutcome::Abandoned
        }
        Err(_) => {
            tracing::warn!(events = ?names, timeout_ms = timeout.as_millis() as u64, "Timed out waiting for events");
            WaitOutcome::TimedOut
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fired_event_resolves() {
        let event = SingleUseEvent::fired("ready");
        assert_eq!(
            wait_with_timeout(event, Duration::from_millis(50)).await,
            WaitOutcome::Fired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfired_event_times_out() {
        let (_trigger, event) = SingleUseEvent::pair("never");
        assert_eq!(
            wait_with_timeout(event, Duration::from_secs(30)).await,
            WaitOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_dropped_trigger_is_abandoned() {
        let (trigger, event) = SingleUseEvent::pair("dropped");
        drop(trigger);
        assert_eq!(
            wait_with_timeout(event, Duration::from_secs(1)).await,
            WaitOutcome::Abandoned
        );
    }

    #[tokio::test]
    async fn test_trigger_fired_from_task() {
        let (trigger, event) = SingleUseEvent::pair("late");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.fire();
        });
        assert_eq!(
            wait_with_timeout(event, Duration::from_secs(5)).await,
            WaitOutcome::Fired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_needs_every_event() {
        let (first, a) = SingleUseEvent::pair("a");
        let (_second, b) = SingleUseEvent::pair("b");
        first.fire();
        assert_eq!(
            wait_all_with_timeout(vec![a, b], Duration::from_secs(1)).await,
            WaitOutcome::TimedOut
        );
        assert_eq!(
            wait_all_with_timeout(Vec::new(), Duration::from_secs(1)).await,
            WaitOutcome::Fired
        );
    }

    #[test]
    fn test_fire_without_listener() {
        let (trigger, event) = SingleUseEvent::pair("orphan");
        drop(event);
        assert!(!trigger.fire());
    }
}
