//! The queue service capability consumed by the consumer and producer.

use crate::error::QueueError;
use crate::message::{
    OutboundMessage, ReceiptHandle, ReceiveRequest, ReceivedMessage, SendBatchOutput,
};
use async_trait::async_trait;

/// Remote queue operations.
///
/// Implementations are shared as `Arc<dyn QueueGateway>` between the polling
/// loop and every in-flight handler, so calls take `&self` and keep no
/// per-call state.
#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Receive up to `request.max_number_of_messages` messages.
    ///
    /// Returns an empty list when nothing arrives within the wait window.
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Acknowledge a received message by deleting it
    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Send up to [`max_batch_size`](Self::max_batch_size) entries in one call.
    ///
    /// Per-entry rejections are reported in [`SendBatchOutput::failed`]; an
    /// `Err` means the call as a whole failed.
    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: &[OutboundMessage],
    ) -> Result<SendBatchOutput, QueueError>;

    /// Largest number of entries accepted by one send-batch call
    fn max_batch_size(&self) -> usize;
}
