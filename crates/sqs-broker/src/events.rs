//! Lifecycle and error events published by the consumer and producer.
//!
//! Events travel over a bounded [`tokio::sync::broadcast`] channel. Emitting
//! never waits: with no subscribers the event is dropped, and a subscriber that
//! falls more than the channel capacity behind skips the oldest events rather
//! than holding up the polling loop.

use crate::error::{ProcessingError, QueueError};
use crate::message::{BatchResultErrorEntry, ReceivedMessage};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// Buffered events per subscriber before the oldest are skipped
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Multi-subscriber, non-blocking event publisher
#[derive(Debug)]
pub struct EventChannel<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventChannel<E> {
    /// Create a channel buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber; it sees events emitted from now on
    pub fn subscribe(&self) -> Subscription<E> {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event, returning how many subscribers it reached
    pub fn emit(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone + Send + 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Handle returned by [`EventChannel::subscribe`]; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription<E> {
    receiver: broadcast::Receiver<E>,
}

impl<E: Clone> Subscription<E> {
    /// Wait for the next event.
    ///
    /// Returns `None` once the publisher is gone and all buffered events have
    /// been read.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event subscriber lagged; events skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event subscriber lagged; events skipped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {
        drop(self.receiver);
    }
}

// ============================================================================
// Consumer Events
// ============================================================================

/// Events emitted by the polling loop
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    /// A message was received and is about to be handled
    MessageReceived(Arc<ReceivedMessage>),

    /// The handler succeeded and the message was deleted
    MessageProcessed(Arc<ReceivedMessage>),

    /// The handler or the delete failed; the message stays on the queue
    ProcessingError {
        error: Arc<ProcessingError>,
        message: Arc<ReceivedMessage>,
    },

    /// Every message of a non-empty receive reached its outcome
    ResponseProcessed,

    /// A receive call returned no messages
    Empty,

    /// A receive call failed; the loop has halted until restarted
    Error(Arc<QueueError>),

    /// The loop observed the stop request and exited
    Stopped,
}

impl ConsumerEvent {
    /// Stable event name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageReceived(_) => "message_received",
            Self::MessageProcessed(_) => "message_processed",
            Self::ProcessingError { .. } => "processing_error",
            Self::ResponseProcessed => "response_processed",
            Self::Empty => "empty",
            Self::Error(_) => "error",
            Self::Stopped => "stopped",
        }
    }
}

// ============================================================================
// Producer Events
// ============================================================================

/// Events emitted while sending
#[derive(Debug, Clone)]
pub enum ProducerEvent {
    /// One send-batch call returned
    ChunkSent {
        chunk_index: usize,
        entry_count: usize,
        successful_count: usize,
        failed: Vec<BatchResultErrorEntry>,
    },

    /// Every entry of a send call was accepted
    Completed { successful_count: usize },

    /// Every chunk was attempted and some entries were rejected
    PartialFailure { failed_ids: Vec<String> },

    /// A send-batch call failed; remaining chunks were abandoned
    Error(Arc<QueueError>),
}

impl ProducerEvent {
    /// Stable event name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChunkSent { .. } => "chunk_sent",
            Self::Completed { .. } => "completed",
            Self::PartialFailure { .. } => "partial_failure",
            Self::Error(_) => "error",
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
