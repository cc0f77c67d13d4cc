//! Broadcast channel for registry events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Registries
//! publish a [`RegistryEvent`] on every service change and the gateway
//! subscribes once to schedule rebuilds.

use tokio::sync::broadcast;

use super::RegistryEvent;

/// Broadcast bus for [`RegistryEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers. A lagging gateway simply rebuilds once more.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: RegistryEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
