//! Bounded broadcast bus for crawl events.
//!
//! The engine must never block on observers, so delivery is best-effort
//! over a bounded `tokio::sync::broadcast` channel: subscribers that fall
//! behind lose the oldest events (they see a `Lagged` error and keep
//! going), and publishing without subscribers is a no-op.

use tokio::sync::broadcast;

use super::types::CrawlEvent;

/// Default ring-buffer capacity per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// Cloneable handle to the event stream.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CrawlEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events from this point forward.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; never blocks, never fails the crawl.
    pub fn publish(&self, event: CrawlEvent) {
        // Err means no live subscribers, which is fine.
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
