//! # SQS Broker
//!
//! Polling consumer and batching producer for AWS SQS queues.
//!
//! - [`Consumer`] long-polls a queue, runs a [`MessageHandler`] for every
//!   received message concurrently and deletes the ones that were handled
//! - [`Producer`] splits any number of outbound messages into service-sized
//!   batches and reports which entries the service rejected
//! - Both publish lifecycle events over an [`EventChannel`]
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for queue, processing and producer failures
//! - [`message`] - Received and outbound message structures
//! - [`config`] - Consumer and producer configuration
//! - [`gateway`] - The queue service capability
//! - [`providers`] - SQS and in-memory gateways
//! - [`events`] - Event channel and event types
//! - [`consumer`] / [`producer`] - The polling loop and batch sender
//!
//! ## Example
//!
//! ```no_run
//! use sqs_broker::{handler_fn, Consumer, ConsumerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConsumerConfig::new("https://sqs.eu-west-1.amazonaws.com/123456789012/orders");
//! let consumer = Consumer::new(
//!     config,
//!     handler_fn(|message| async move {
//!         println!("received {}", message.body);
//!         Ok::<(), std::io::Error>(())
//!     }),
//! )?;
//!
//! let mut events = consumer.subscribe();
//! consumer.start();
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.kind());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod gateway;
pub mod message;
pub mod producer;
pub mod providers;

pub use config::{ConsumerConfig, ProducerConfig};
pub use consumer::{handler_fn, Consumer, ConsumerState, HandlerFn, MessageHandler};
pub use error::{
    BoxError, ConfigurationError, ProcessingError, ProducerError, QueueError, SerializationError,
    ValidationError,
};
pub use events::{ConsumerEvent, EventChannel, ProducerEvent, Subscription};
pub use gateway::QueueGateway;
pub use message::{
    BatchResultErrorEntry, IntoOutboundMessages, MessageAttributeValue, OutboundMessage,
    ReceiptHandle, ReceiveRequest, ReceivedMessage, SendBatchOutput, SendBatchResultEntry,
};
pub use producer::Producer;
pub use providers::{InMemoryConfig, InMemoryGateway, SqsGateway, SqsGatewayConfig};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
