//! Subscriber types for state diff events.
//!
//! A Subscriber is any consumer that wants to see every
//! [`StateUpdatedEvent`] the engine emits, such as a bridge to a UI or VM.

use std::sync::atomic::{AtomicU64, Ordering};

use super::event::StateUpdatedEvent;

/// Unique identifier for a subscriber.
///
/// Returned by [`PrecalculationEngine::subscribe`](super::PrecalculationEngine::subscribe)
/// and used to unsubscribe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A listener for state diff events.
pub struct Subscriber {
    id: SubscriberId,
    notify: Box<dyn Fn(&StateUpdatedEvent)>,
}

impl Subscriber {
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(&StateUpdatedEvent) + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Deliver an event to the listener.
    pub fn notify(&self, event: &StateUpdatedEvent) {
        (self.notify)(event);
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}
