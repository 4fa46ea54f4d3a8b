//! Queue gateway implementations.
//!
//! Concrete [`QueueGateway`](crate::gateway::QueueGateway) backends: AWS SQS
//! over HTTP and an in-process queue for tests and local development.

pub mod memory;
pub mod sqs;

pub use memory::{InMemoryConfig, InMemoryGateway};
pub use sqs::{SqsGateway, SqsGatewayConfig};
