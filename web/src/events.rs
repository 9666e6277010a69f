//! In-process fan-out of domain events.
//!
//! The core only names and emits events. This publisher hands them to a
//! `tokio::sync::broadcast` channel that a realtime layer (websocket or SSE
//! gateway) subscribes to.

use rifa_core::events::{DomainEvent, EventPublisher, PublishError};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

/// Default channel capacity. Slow subscribers lag instead of blocking writers.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Broadcasts every domain event to current subscribers.
#[derive(Clone, Debug)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventPublisher {
    /// Creates a publisher buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        Box::pin(async move {
            tracing::debug!(
                event = event.name(),
                raffle_id = %event.raffle_id(),
                "Publishing domain event"
            );
            // No subscriber is not a failure: nobody is watching the raffle.
            let _ = self.sender.send(event);
            Ok(())
        })
    }
}
