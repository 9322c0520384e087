//! Typed publish/subscribe channels
//!
//! Each producing component owns one [`EventBus`] for its own payload type.
//! Subscribers hold an [`EventStream`] and poll it from their tick, or await
//! it from async code. Publishing never blocks and never fails when nobody
//! is listening.

use tokio::sync::broadcast;
use tracing::warn;

/// Default number of buffered events per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast channel owned by a producer
#[derive(Debug)]
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Open a new subscription; only events published afterwards are seen
    pub fn subscribe(&self) -> EventStream<E> {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish to every live subscriber, returning how many received it
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of an [`EventBus`]
#[derive(Debug)]
pub struct EventStream<E: Clone> {
    receiver: broadcast::Receiver<E>,
}

impl<E: Clone> EventStream<E> {
    /// Take the next buffered event without waiting
    pub fn try_next(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Take every buffered event
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Wait for the next event; `None` once the bus is dropped
    pub async fn next(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
