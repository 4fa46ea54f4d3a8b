//! Error types for queue, consumer and producer operations.

use crate::message::{BatchResultErrorEntry, SendBatchResultEntry};
use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a [`QueueGateway`](crate::gateway::QueueGateway) call.
///
/// These are transport or service level failures. A receive failure halts the
/// consumer loop; a send failure aborts the remaining chunks of a producer call.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_url}")]
    QueueNotFound { queue_url: String },

    #[error("Receipt handle is invalid or expired: {receipt}")]
    ReceiptHandleInvalid { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Batch size {size} exceeds maximum {max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the caller may retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::ReceiptHandleInvalid { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::BatchTooLarge { .. } => false,
            Self::ProviderError { .. } => true,
            Self::SerializationError(_) => false,
            Self::ConfigurationError(_) => false,
            Self::ValidationError(_) => false,
        }
    }
}

/// Errors while encoding requests or decoding service responses
#[derive(Debug, Clone, Error)]
pub enum SerializationError {
    #[error("Malformed XML response: {message}")]
    Xml { message: String },

    #[error("Response is missing required element: {element}")]
    MissingElement { element: String },

    #[error("Message attribute '{key}' has invalid value")]
    InvalidAttribute { key: String },
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("A Tokio runtime is required to drive the consumer")]
    NoRuntime,
}

/// Validation errors
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Failure of a single received message.
///
/// Never propagates past the message: it is reported through
/// [`ConsumerEvent::ProcessingError`](crate::events::ConsumerEvent) and the
/// message stays on the queue.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Message handler failed: {0}")]
    Handler(BoxError),

    #[error("Message handler panicked: {message}")]
    HandlerPanicked { message: String },

    #[error("Failed to delete processed message: {0}")]
    Delete(#[source] QueueError),
}

/// Errors returned by [`Producer::send`](crate::producer::Producer::send)
#[derive(Debug, Error)]
pub enum ProducerError {
    /// At least one entry was rejected. Every chunk was still attempted.
    #[error("failed to send messages: {}", join_ids(.failed))]
    PartialFailure {
        failed: Vec<BatchResultErrorEntry>,
        successful: Vec<SendBatchResultEntry>,
    },

    /// A send-batch call failed as a whole; later chunks were not sent.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ProducerError {
    /// Ids of the rejected entries, across every chunk, in send order
    pub fn failed_ids(&self) -> Vec<&str> {
        match self {
            Self::PartialFailure { failed, .. } => failed.iter().map(|e| e.id.as_str()).collect(),
            Self::Queue(_) => Vec::new(),
        }
    }
}

fn join_ids(entries: &[BatchResultErrorEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
