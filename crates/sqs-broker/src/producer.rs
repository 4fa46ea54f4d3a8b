//! Batching producer.
//!
//! [`Producer::send`] accepts any number of messages, splits them into chunks
//! of `batch_size` and sends the chunks one after another. Entries the service
//! rejects do not stop the remaining chunks; they are collected and reported
//! together once every chunk has been attempted.

use crate::config::ProducerConfig;
use crate::error::{ConfigurationError, ProducerError, QueueError};
use crate::events::{EventChannel, ProducerEvent, Subscription, DEFAULT_EVENT_CAPACITY};
use crate::gateway::QueueGateway;
use crate::message::{BatchResultErrorEntry, IntoOutboundMessages, SendBatchResultEntry};
use crate::providers::{SqsGateway, SqsGatewayConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Sends messages to one queue in service-sized batches
pub struct Producer {
    config: ProducerConfig,
    gateway: Arc<dyn QueueGateway>,
    events: EventChannel<ProducerEvent>,
}

impl Producer {
    /// Create a producer talking to SQS in `config.region`, with credentials
    /// from the environment
    pub fn new(config: ProducerConfig) -> Result<Self, QueueError> {
        let gateway = SqsGateway::new(SqsGatewayConfig::from_env(&config.region))?;
        Self::with_gateway(config, Arc::new(gateway))
    }

    /// Create a producer using an existing gateway
    ///
    /// # Errors
    ///
    /// The configuration is invalid, or `batch_size` exceeds what the gateway
    /// accepts in one call.
    pub fn with_gateway(
        config: ProducerConfig,
        gateway: Arc<dyn QueueGateway>,
    ) -> Result<Self, QueueError> {
        config.validate()?;

        let max_batch_size = gateway.max_batch_size();
        if config.batch_size > max_batch_size {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "batch_size must be at most {}, got {}",
                    max_batch_size, config.batch_size
                ),
            }
            .into());
        }

        Ok(Self {
            config,
            gateway,
            events: EventChannel::new(DEFAULT_EVENT_CAPACITY),
        })
    }

    /// Send every message, `batch_size` per call, in input order.
    ///
    /// Returns the service metadata of every accepted entry, in chunk order.
    ///
    /// # Errors
    ///
    /// - [`ProducerError::PartialFailure`] when some entries were rejected;
    ///   all chunks were still sent
    /// - [`ProducerError::Queue`] when a send call failed as a whole; the
    ///   chunks after it were not sent
    pub async fn send<M: IntoOutboundMessages>(
        &self,
        messages: M,
    ) -> Result<Vec<SendBatchResultEntry>, ProducerError> {
        let messages = messages.into_outbound_messages();
        if messages.is_empty() {
            debug!(queue_url = %self.config.queue_url, "Nothing to send");
            return Ok(Vec::new());
        }

        let mut successful: Vec<SendBatchResultEntry> = Vec::with_capacity(messages.len());
        let mut failed: Vec<BatchResultErrorEntry> = Vec::new();

        for (chunk_index, chunk) in messages.chunks(self.config.batch_size).enumerate() {
            let output = match self
                .gateway
                .send_message_batch(&self.config.queue_url, chunk)
                .await
            {
                Ok(output) => output,
                Err(err) => {
                    error!(
                        queue_url = %self.config.queue_url,
                        chunk_index = chunk_index,
                        error = %err,
                        "Send batch call failed; remaining messages not sent"
                    );
                    self.events.emit(ProducerEvent::Error(Arc::new(err.clone())));
                    return Err(ProducerError::Queue(err));
                }
            };

            debug!(
                queue_url = %self.config.queue_url,
                chunk_index = chunk_index,
                entries = chunk.len(),
                successful = output.successful.len(),
                failed = output.failed.len(),
                "Chunk sent"
            );
            self.events.emit(ProducerEvent::ChunkSent {
                chunk_index,
                entry_count: chunk.len(),
                successful_count: output.successful.len(),
                failed: output.failed.clone(),
            });

            successful.extend(output.successful);
            failed.extend(output.failed);
        }

        if failed.is_empty() {
            info!(
                queue_url = %self.config.queue_url,
                sent = successful.len(),
                "Messages sent"
            );
            self.events.emit(ProducerEvent::Completed {
                successful_count: successful.len(),
            });
            return Ok(successful);
        }

        let error = ProducerError::PartialFailure { failed, successful };
        warn!(
            queue_url = %self.config.queue_url,
            failed = error.failed_ids().len(),
            error = %error,
            "Some messages were rejected"
        );
        self.events.emit(ProducerEvent::PartialFailure {
            failed_ids: error.failed_ids().into_iter().map(String::from).collect(),
        });
        Err(error)
    }

    /// Subscribe to the producer's events
    pub fn subscribe(&self) -> Subscription<ProducerEvent> {
        self.events.subscribe()
    }

    /// The configuration this producer was built with
    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("queue_url", &self.config.queue_url)
            .field("batch_size", &self.config.batch_size)
            .finish()
    }
}
