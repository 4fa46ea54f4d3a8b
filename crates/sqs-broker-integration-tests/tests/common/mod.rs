//! Common test utilities for sqs-broker integration tests
//!
//! This module provides:
//! - A recording message handler with scripted failures
//! - A gateway wrapper that fails a number of receive calls
//! - Helpers for waiting on consumer events

use async_trait::async_trait;
use sqs_broker::{
    BoxError, ConsumerConfig, ConsumerEvent, InMemoryGateway, MessageHandler, OutboundMessage,
    QueueError, QueueGateway, ReceiptHandle, ReceiveRequest, ReceivedMessage, SendBatchOutput,
    Subscription,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const QUEUE_URL: &str = "https://sqs.eu-west-1.amazonaws.com/123456789012/orders";

/// Consumer configuration suited to the in-memory gateway: short long-polling
/// waits so stop requests are observed quickly
#[allow(dead_code)]
pub fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        queue_url: QUEUE_URL.to_string(),
        region: "eu-west-1".to_string(),
        wait_time_seconds: 1,
        max_number_of_messages: 10,
        attribute_names: vec!["All".to_string()],
        ..ConsumerConfig::default()
    }
}

/// Route test logs through the test writer; repeat calls are ignored
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler that records every delivery and fails a body a set number of times
#[derive(Clone, Default)]
pub struct RecordingHandler {
    deliveries: Arc<Mutex<Vec<Arc<ReceivedMessage>>>>,
    failures_left: Arc<Mutex<HashMap<String, usize>>>,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` deliveries of `body`
    pub fn fail_body(&self, body: &str, times: usize) {
        self.failures_left
            .lock()
            .unwrap()
            .insert(body.to_string(), times);
    }

    pub fn deliveries(&self) -> Vec<Arc<ReceivedMessage>> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.deliveries()
            .iter()
            .map(|message| message.body.clone())
            .collect()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: Arc<ReceivedMessage>) -> Result<(), BoxError> {
        self.deliveries.lock().unwrap().push(message.clone());

        let mut failures = self.failures_left.lock().unwrap();
        match failures.get_mut(&message.body) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(format!("scripted failure for {}", message.body).into())
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Flaky Gateway
// ============================================================================

/// In-memory gateway whose first receive calls fail
#[derive(Clone)]
pub struct FlakyGateway {
    inner: InMemoryGateway,
    failing_receives: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FlakyGateway {
    pub fn new(inner: InMemoryGateway, failing_receives: usize) -> Self {
        Self {
            inner,
            failing_receives: Arc::new(AtomicUsize::new(failing_receives)),
        }
    }
}

#[async_trait]
impl QueueGateway for FlakyGateway {
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let failing = self
            .failing_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::ConnectionFailed {
                message: "connection reset by peer".to_string(),
            });
        }
        self.inner.receive_messages(request).await
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.inner.delete_message(queue_url, receipt).await
    }

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: &[OutboundMessage],
    ) -> Result<SendBatchOutput, QueueError> {
        self.inner.send_message_batch(queue_url, entries).await
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }
}

// ============================================================================
// Event Helpers
// ============================================================================

/// Wait for the first event matching `predicate`, panicking after `timeout`
#[allow(dead_code)]
pub async fn wait_for_event<F>(
    events: &mut Subscription<ConsumerEvent>,
    timeout: Duration,
    mut predicate: F,
) -> ConsumerEvent
where
    F: FnMut(&ConsumerEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if predicate(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .expect("timed out waiting for consumer event")
}

/// Wait until `count` messages were processed
#[allow(dead_code)]
pub async fn wait_for_processed(
    events: &mut Subscription<ConsumerEvent>,
    count: usize,
    timeout: Duration,
) {
    let mut processed = 0;
    while processed < count {
        wait_for_event(events, timeout, |event| {
            matches!(event, ConsumerEvent::MessageProcessed(_))
        })
        .await;
        processed += 1;
    }
}
