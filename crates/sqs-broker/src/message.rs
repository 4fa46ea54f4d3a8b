//! Message types for receiving and sending queue entries.

use crate::error::ValidationError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Receipt Handles
// ============================================================================

/// Per-delivery token required to delete a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle with validation
    pub fn new(handle: String) -> Result<Self, ValidationError> {
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }

        Ok(Self(handle))
    }

    /// Fresh random handle, for gateways that issue their own receipts
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get receipt handle as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReceiptHandle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

// ============================================================================
// Message Attributes
// ============================================================================

/// Typed value of a user-defined message attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttributeValue {
    /// `String`, `Number`, `Binary`, optionally with a custom suffix (`Number.int`)
    pub data_type: String,
    pub string_value: Option<String>,
    pub binary_value: Option<Bytes>,
}

impl MessageAttributeValue {
    /// `String` attribute
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    /// `Number` attribute; the service carries numbers as strings
    pub fn number(value: impl ToString) -> Self {
        Self {
            data_type: "Number".to_string(),
            string_value: Some(value.to_string()),
            binary_value: None,
        }
    }

    /// `Binary` attribute
    pub fn binary(value: impl Into<Bytes>) -> Self {
        Self {
            data_type: "Binary".to_string(),
            string_value: None,
            binary_value: Some(value.into()),
        }
    }

    /// Whether the data type is in the binary family
    pub fn is_binary(&self) -> bool {
        self.data_type.starts_with("Binary")
    }
}

// ============================================================================
// Received Messages
// ============================================================================

/// A message delivered by the queue service.
///
/// Owned by the consumer for one handling attempt. The receipt handle is what
/// acknowledges it; the message id is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub message_id: Option<String>,
    pub receipt_handle: ReceiptHandle,
    pub body: String,
    pub md5_of_body: Option<String>,
    /// System attributes requested through `attribute_names`
    pub attributes: HashMap<String, String>,
    /// User attributes requested through `message_attribute_names`
    pub message_attributes: HashMap<String, MessageAttributeValue>,
}

impl ReceivedMessage {
    /// Create a message with only a receipt handle and body
    pub fn new(receipt_handle: ReceiptHandle, body: impl Into<String>) -> Self {
        Self {
            message_id: None,
            receipt_handle,
            body: body.into(),
            md5_of_body: None,
            attributes: HashMap::new(),
            message_attributes: HashMap::new(),
        }
    }

    /// Number of times the service has delivered this message, when requested
    pub fn receive_count(&self) -> Option<u32> {
        self.attributes
            .get("ApproximateReceiveCount")
            .and_then(|count| count.parse().ok())
    }
}

/// Parameters of a single receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub attribute_names: Vec<String>,
    pub wait_time_seconds: u32,
    pub visibility_timeout: Option<u32>,
    pub max_number_of_messages: u32,
    pub message_attribute_names: Vec<String>,
}

// ============================================================================
// Outbound Messages
// ============================================================================

/// A message to send.
///
/// `id` only has to be unique within one send call; it is how the service
/// reports per-entry success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub body: String,
    pub delay_seconds: Option<u32>,
    /// FIFO queues only
    pub group_id: Option<String>,
    /// FIFO queues only
    pub deduplication_id: Option<String>,
    pub attributes: HashMap<String, MessageAttributeValue>,
    pub system_attributes: HashMap<String, MessageAttributeValue>,
}

impl OutboundMessage {
    /// Create new message with an explicit id
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            delay_seconds: None,
            group_id: None,
            deduplication_id: None,
            attributes: HashMap::new(),
            system_attributes: HashMap::new(),
        }
    }

    /// Create new message with a generated id
    pub fn with_generated_id(body: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), body)
    }

    /// Delay delivery of this message
    pub fn with_delay_seconds(mut self, delay_seconds: u32) -> Self {
        self.delay_seconds = Some(delay_seconds);
        self
    }

    /// Set the FIFO message group
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the FIFO deduplication id
    pub fn with_deduplication_id(mut self, deduplication_id: impl Into<String>) -> Self {
        self.deduplication_id = Some(deduplication_id.into());
        self
    }

    /// Add a user-defined attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: MessageAttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Add a system attribute (e.g. `AWSTraceHeader`)
    pub fn with_system_attribute(
        mut self,
        name: impl Into<String>,
        value: MessageAttributeValue,
    ) -> Self {
        self.system_attributes.insert(name.into(), value);
        self
    }
}

/// A bare string becomes a message whose id and body are both that string
impl From<&str> for OutboundMessage {
    fn from(body: &str) -> Self {
        Self::new(body, body)
    }
}

impl From<String> for OutboundMessage {
    fn from(body: String) -> Self {
        Self::new(body.clone(), body)
    }
}

/// Anything [`Producer::send`](crate::producer::Producer::send) accepts: one
/// message or a list, each a bare string or an [`OutboundMessage`].
pub trait IntoOutboundMessages {
    fn into_outbound_messages(self) -> Vec<OutboundMessage>;
}

impl IntoOutboundMessages for &str {
    fn into_outbound_messages(self) -> Vec<OutboundMessage> {
        vec![self.into()]
    }
}

impl IntoOutboundMessages for String {
    fn into_outbound_messages(self) -> Vec<OutboundMessage> {
        vec![self.into()]
    }
}

impl IntoOutboundMessages for OutboundMessage {
    fn into_outbound_messages(self) -> Vec<OutboundMessage> {
        vec![self]
    }
}

impl<T: Into<OutboundMessage>> IntoOutboundMessages for Vec<T> {
    fn into_outbound_messages(self) -> Vec<OutboundMessage> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<OutboundMessage>, const N: usize> IntoOutboundMessages for [T; N] {
    fn into_outbound_messages(self) -> Vec<OutboundMessage> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Clone + Into<OutboundMessage>> IntoOutboundMessages for &[T] {
    fn into_outbound_messages(self) -> Vec<OutboundMessage> {
        self.iter().cloned().map(Into::into).collect()
    }
}

// ============================================================================
// Send Batch Results
// ============================================================================

/// Service metadata for an accepted entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendBatchResultEntry {
    pub id: String,
    pub message_id: String,
    pub md5_of_message_body: Option<String>,
    pub md5_of_message_attributes: Option<String>,
    pub md5_of_message_system_attributes: Option<String>,
    /// FIFO queues only
    pub sequence_number: Option<String>,
}

/// A rejected entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResultErrorEntry {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    /// Whether the caller, not the service, caused the failure
    pub sender_fault: bool,
}

/// Outcome of one send-batch call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBatchOutput {
    pub successful: Vec<SendBatchResultEntry>,
    pub failed: Vec<BatchResultErrorEntry>,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
