//! In-memory queue gateway for testing and development.
//!
//! Behaves like a small SQS:
//! - Queues are created on first use and keyed by queue URL
//! - Received messages stay hidden for the visibility timeout and come back
//!   unless deleted
//! - Per-message delay, long polling woken by sends
//! - Queue URLs ending in `.fifo` require a message group id
//!
//! Everything lives in process memory and is lost when the gateway is dropped.

use crate::error::QueueError;
use crate::gateway::QueueGateway;
use crate::message::{
    BatchResultErrorEntry, MessageAttributeValue, OutboundMessage, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, SendBatchOutput, SendBatchResultEntry,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const PROVIDER_NAME: &str = "InMemory";

/// Re-check interval while long polling, so delayed and re-visible messages
/// are picked up without a send to wake the waiter
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Settings for [`InMemoryGateway`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Messages a queue holds (visible, delayed and in flight) before rejecting entries
    pub max_queue_size: usize,
    /// Visibility timeout when a receive does not set one
    pub default_visibility_timeout_seconds: u32,
    /// Entries accepted per send-batch call
    pub max_batch_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            default_visibility_timeout_seconds: 30,
            max_batch_size: crate::config::SERVICE_BATCH_LIMIT,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

struct QueueStorage {
    queues: HashMap<String, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn get_or_create_queue(&mut self, queue_url: &str) -> &mut InMemoryQueue {
        self.queues
            .entry(queue_url.to_string())
            .or_insert_with(|| InMemoryQueue::new(queue_url.ends_with(".fifo")))
    }
}

struct InMemoryQueue {
    fifo: bool,
    /// Messages waiting to be received, oldest first
    messages: VecDeque<StoredMessage>,
    /// Received messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
    next_sequence_number: u64,
}

impl InMemoryQueue {
    fn new(fifo: bool) -> Self {
        Self {
            fifo,
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            next_sequence_number: 1,
        }
    }

    fn len(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }

    /// Return messages whose visibility timeout ran out to the queue
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_back(in_flight.message);
            }
        }
    }
}

#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, MessageAttributeValue>,
    group_id: Option<String>,
    deduplication_id: Option<String>,
    sent_timestamp: i64,
    first_receive_timestamp: Option<i64>,
    receive_count: u32,
    available_at: Instant,
}

impl StoredMessage {
    fn system_attributes(&self) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        attributes.insert(
            "ApproximateReceiveCount".to_string(),
            self.receive_count.to_string(),
        );
        attributes.insert("SentTimestamp".to_string(), self.sent_timestamp.to_string());
        if let Some(first_receive) = self.first_receive_timestamp {
            attributes.insert(
                "ApproximateFirstReceiveTimestamp".to_string(),
                first_receive.to_string(),
            );
        }
        if let Some(group_id) = &self.group_id {
            attributes.insert("MessageGroupId".to_string(), group_id.clone());
        }
        if let Some(deduplication_id) = &self.deduplication_id {
            attributes.insert(
                "MessageDeduplicationId".to_string(),
                deduplication_id.clone(),
            );
        }
        attributes
    }
}

struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

// ============================================================================
// InMemoryGateway
// ============================================================================

/// [`QueueGateway`] backed by process memory.
///
/// Clones share the same queues.
#[derive(Clone)]
pub struct InMemoryGateway {
    storage: Arc<RwLock<QueueStorage>>,
    notify: Arc<Notify>,
}

impl InMemoryGateway {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage {
                queues: HashMap::new(),
                config,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Messages waiting in the queue, including delayed ones
    pub fn approximate_number_of_messages(&self, queue_url: &str) -> usize {
        let mut storage = self.write();
        match storage.queues.get_mut(queue_url) {
            Some(queue) => {
                queue.release_expired(Instant::now());
                queue.messages.len()
            }
            None => 0,
        }
    }

    /// Messages received but neither deleted nor visible again
    pub fn in_flight_count(&self, queue_url: &str) -> usize {
        let mut storage = self.write();
        match storage.queues.get_mut(queue_url) {
            Some(queue) => {
                queue.release_expired(Instant::now());
                queue.in_flight.len()
            }
            None => 0,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueStorage> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take whatever is receivable right now
    fn take_available(&self, request: &ReceiveRequest) -> Vec<ReceivedMessage> {
        let mut storage = self.write();
        let default_visibility = storage.config.default_visibility_timeout_seconds;
        let queue = storage.get_or_create_queue(&request.queue_url);

        let now = Instant::now();
        queue.release_expired(now);

        let visibility = Duration::from_secs(u64::from(
            request.visibility_timeout.unwrap_or(default_visibility),
        ));
        let max_messages = request.max_number_of_messages.max(1) as usize;

        let mut received = Vec::new();
        let mut remaining = VecDeque::with_capacity(queue.messages.len());

        while let Some(mut message) = queue.messages.pop_front() {
            if received.len() >= max_messages || message.available_at > now {
                remaining.push_back(message);
                continue;
            }

            message.receive_count += 1;
            let receive_timestamp = Utc::now().timestamp_millis();
            message.first_receive_timestamp.get_or_insert(receive_timestamp);

            let receipt = ReceiptHandle::generate();
            received.push(ReceivedMessage {
                message_id: Some(message.message_id.clone()),
                receipt_handle: receipt.clone(),
                body: message.body.clone(),
                md5_of_body: None,
                attributes: filter_system_attributes(
                    message.system_attributes(),
                    &request.attribute_names,
                ),
                message_attributes: filter_message_attributes(
                    &message.attributes,
                    &request.message_attribute_names,
                ),
            });
            queue.in_flight.insert(
                receipt.as_str().to_string(),
                InFlightMessage {
                    message,
                    visible_at: now + visibility,
                },
            );
        }

        queue.messages = remaining;
        received
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl std::fmt::Debug for InMemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryGateway")
            .field("queues", &storage.queues.len())
            .field("config", &storage.config)
            .finish()
    }
}

#[async_trait]
impl QueueGateway for InMemoryGateway {
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(request.wait_time_seconds));

        loop {
            // Registered before checking so a send in between still wakes us
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let messages = self.take_available(request);
            let now = Instant::now();
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }

            let _ = tokio::time::timeout((deadline - now).min(POLL_INTERVAL), notified).await;
        }
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.write();
        let queue = storage
            .queues
            .get_mut(queue_url)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_url: queue_url.to_string(),
            })?;

        // Deleting with the latest receipt works even after the timeout ran
        // out, as long as nobody received the message again
        match queue.in_flight.remove(receipt.as_str()) {
            Some(_) => Ok(()),
            None => Err(QueueError::ReceiptHandleInvalid {
                receipt: receipt.to_string(),
            }),
        }
    }

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: &[OutboundMessage],
    ) -> Result<SendBatchOutput, QueueError> {
        let mut storage = self.write();
        let max_batch_size = storage.config.max_batch_size;
        let max_queue_size = storage.config.max_queue_size;

        if entries.is_empty() {
            return Err(provider_error(
                "AWS.SimpleQueueService.EmptyBatchRequest",
                "There should be at least one SendMessageBatchRequestEntry in the request.",
            ));
        }
        if entries.len() > max_batch_size {
            return Err(QueueError::BatchTooLarge {
                size: entries.len(),
                max_size: max_batch_size,
            });
        }
        let mut ids = HashSet::new();
        if let Some(duplicate) = entries.iter().find(|entry| !ids.insert(entry.id.as_str())) {
            return Err(provider_error(
                "AWS.SimpleQueueService.BatchEntryIdsNotDistinct",
                &format!("Id {} repeated.", duplicate.id),
            ));
        }

        let queue = storage.get_or_create_queue(queue_url);
        let now = Instant::now();
        let mut output = SendBatchOutput::default();

        for entry in entries {
            if let Some(failure) = reject_entry(queue, entry, max_queue_size) {
                output.failed.push(failure);
                continue;
            }

            let message_id = uuid::Uuid::new_v4().to_string();
            let sequence_number = queue.fifo.then(|| {
                let sequence = queue.next_sequence_number;
                queue.next_sequence_number += 1;
                format!("{:020}", sequence)
            });
            let delay = Duration::from_secs(u64::from(entry.delay_seconds.unwrap_or(0)));

            queue.messages.push_back(StoredMessage {
                message_id: message_id.clone(),
                body: entry.body.clone(),
                attributes: entry.attributes.clone(),
                group_id: entry.group_id.clone(),
                deduplication_id: entry.deduplication_id.clone(),
                sent_timestamp: Utc::now().timestamp_millis(),
                first_receive_timestamp: None,
                receive_count: 0,
                available_at: now + delay,
            });
            output.successful.push(SendBatchResultEntry {
                id: entry.id.clone(),
                message_id,
                md5_of_message_body: None,
                md5_of_message_attributes: None,
                md5_of_message_system_attributes: None,
                sequence_number,
            });
        }

        drop(storage);
        if !output.successful.is_empty() {
            self.notify.notify_waiters();
        }

        Ok(output)
    }

    fn max_batch_size(&self) -> usize {
        self.storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .max_batch_size
    }
}

fn provider_error(code: &str, message: &str) -> QueueError {
    QueueError::ProviderError {
        provider: PROVIDER_NAME.to_string(),
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// Per-entry checks; `Some` means the entry is reported as failed
fn reject_entry(
    queue: &InMemoryQueue,
    entry: &OutboundMessage,
    max_queue_size: usize,
) -> Option<BatchResultErrorEntry> {
    let (code, message, sender_fault) = if entry.body.is_empty() {
        ("InvalidParameterValue", "Message body must not be empty", true)
    } else if queue.fifo && entry.group_id.is_none() {
        (
            "MissingParameter",
            "The request must contain the parameter MessageGroupId.",
            true,
        )
    } else if queue.len() >= max_queue_size {
        ("QueueFull", "The queue has reached its maximum size", false)
    } else {
        return None;
    };

    Some(BatchResultErrorEntry {
        id: entry.id.clone(),
        code: code.to_string(),
        message: Some(message.to_string()),
        sender_fault,
    })
}

fn filter_system_attributes(
    attributes: HashMap<String, String>,
    requested: &[String],
) -> HashMap<String, String> {
    if requested.iter().any(|name| name == "All") {
        return attributes;
    }
    attributes
        .into_iter()
        .filter(|(name, _)| requested.iter().any(|r| r == name))
        .collect()
}

fn filter_message_attributes(
    attributes: &HashMap<String, MessageAttributeValue>,
    requested: &[String],
) -> HashMap<String, MessageAttributeValue> {
    attributes
        .iter()
        .filter(|(name, _)| requested.iter().any(|r| attribute_name_matches(r, name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// `All` and `.*` match everything, `prefix.*` matches `prefix.` names
fn attribute_name_matches(pattern: &str, name: &str) -> bool {
    if pattern == "All" || pattern == ".*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => name.starts_with(prefix),
        _ => pattern == name,
    }
}
