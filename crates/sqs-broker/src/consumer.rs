//! Polling consumer.
//!
//! A [`Consumer`] repeatedly receives a batch of messages, hands every message
//! of the batch to the [`MessageHandler`] concurrently, deletes each message
//! whose handler succeeded, waits the configured inter-poll delay and polls
//! again until stopped.
//!
//! ## Failure handling
//!
//! - A handler error, handler panic, or failed delete affects only that
//!   message: it is reported as [`ConsumerEvent::ProcessingError`], the message
//!   is left on the queue for redelivery, and the loop carries on.
//! - A failed receive call halts the loop. It is reported as
//!   [`ConsumerEvent::Error`] and polling resumes only after another
//!   [`Consumer::start`].
//!
//! ## Stopping
//!
//! [`Consumer::stop`] is cooperative. The running flag is checked once per
//! cycle, after the inter-poll delay; an in-flight receive, handler or delete
//! always completes, after which the loop emits [`ConsumerEvent::Stopped`].

use crate::config::ConsumerConfig;
use crate::error::{BoxError, ConfigurationError, ProcessingError, QueueError};
use crate::events::{ConsumerEvent, EventChannel, Subscription, DEFAULT_EVENT_CAPACITY};
use crate::gateway::QueueGateway;
use crate::message::{ReceiveRequest, ReceivedMessage};
use crate::providers::{SqsGateway, SqsGatewayConfig};
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

// ============================================================================
// Message Handlers
// ============================================================================

/// User code run for every received message.
///
/// Returning `Ok` acknowledges the message (it is deleted); returning `Err`
/// or panicking leaves it on the queue.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: Arc<ReceivedMessage>) -> Result<(), BoxError>;
}

/// [`MessageHandler`] backed by an async closure, see [`handler_fn`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`]
///
/// ```no_run
/// use sqs_broker::consumer::handler_fn;
///
/// let handler = handler_fn(|message| async move {
///     println!("{}", message.body);
///     Ok::<(), std::io::Error>(())
/// });
/// ```
pub fn handler_fn<F, Fut, E>(f: F) -> HandlerFn<F>
where
    F: Fn(Arc<ReceivedMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut, E> MessageHandler for HandlerFn<F>
where
    F: Fn(Arc<ReceivedMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn handle(&self, message: Arc<ReceivedMessage>) -> Result<(), BoxError> {
        (self.f)(message).await.map_err(Into::into)
    }
}

// ============================================================================
// Consumer State
// ============================================================================

/// Where the polling loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// No loop is running
    Stopped,
    /// Waiting for a receive call to return
    Polling,
    /// Waiting for the handlers of the current batch
    Dispatching,
    /// Waiting out the inter-poll delay
    Scheduled,
}

/// Running flag and loop liveness, always updated together
struct LoopControl {
    running: bool,
    loop_active: bool,
    state: ConsumerState,
}

struct ConsumerInner {
    config: ConsumerConfig,
    receive_request: ReceiveRequest,
    gateway: Arc<dyn QueueGateway>,
    handler: Arc<dyn MessageHandler>,
    events: EventChannel<ConsumerEvent>,
    control: Mutex<LoopControl>,
    runtime: Handle,
}

// ============================================================================
// Consumer
// ============================================================================

/// Polls a queue and dispatches messages to a handler.
///
/// Dropping the consumer requests a stop; the loop exits at its next cycle
/// boundary.
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

impl Consumer {
    /// Create a consumer talking to SQS in `config.region`, with credentials
    /// from the environment.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<H: MessageHandler>(config: ConsumerConfig, handler: H) -> Result<Self, QueueError> {
        let gateway = SqsGateway::new(SqsGatewayConfig::from_env(&config.region))?;
        Self::with_gateway(config, Arc::new(gateway), handler)
    }

    /// Create a consumer using an existing gateway.
    ///
    /// Must be called from within a Tokio runtime. Starts polling right away
    /// when `config.start_running` is set.
    pub fn with_gateway<H: MessageHandler>(
        config: ConsumerConfig,
        gateway: Arc<dyn QueueGateway>,
        handler: H,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigurationError::NoRuntime)?;

        let receive_request = ReceiveRequest {
            queue_url: config.queue_url.clone(),
            attribute_names: config.attribute_names.clone(),
            wait_time_seconds: config.wait_time_seconds,
            visibility_timeout: config.visibility_timeout,
            max_number_of_messages: config.max_number_of_messages,
            message_attribute_names: config.message_attribute_names.clone(),
        };

        let start_running = config.start_running;
        let consumer = Self {
            inner: Arc::new(ConsumerInner {
                config,
                receive_request,
                gateway,
                handler: Arc::new(handler),
                events: EventChannel::new(DEFAULT_EVENT_CAPACITY),
                control: Mutex::new(LoopControl {
                    running: false,
                    loop_active: false,
                    state: ConsumerState::Stopped,
                }),
                runtime,
            }),
        };

        if start_running {
            consumer.start();
        }

        Ok(consumer)
    }

    /// Start polling. Does nothing if already running.
    ///
    /// If a previous loop was asked to stop but has not reached its cycle
    /// boundary yet, that loop simply keeps going.
    pub fn start(&self) {
        let spawn_loop = {
            let mut control = self.inner.control();
            if control.running {
                debug!(queue_url = %self.inner.config.queue_url, "Consumer already running");
                return;
            }

            control.running = true;
            if control.loop_active {
                false
            } else {
                control.loop_active = true;
                control.state = ConsumerState::Polling;
                true
            }
        };

        if spawn_loop {
            info!(queue_url = %self.inner.config.queue_url, "Starting consumer");
            self.inner.runtime.spawn(Arc::clone(&self.inner).run());
        }
    }

    /// Request a stop; takes effect at the next cycle boundary
    pub fn stop(&self) {
        let mut control = self.inner.control();
        if control.running {
            info!(queue_url = %self.inner.config.queue_url, "Stopping consumer");
            control.running = false;
        }
    }

    /// Whether the running flag is set
    pub fn is_running(&self) -> bool {
        self.inner.control().running
    }

    /// Current loop state
    pub fn state(&self) -> ConsumerState {
        self.inner.control().state
    }

    /// Subscribe to the consumer's events
    pub fn subscribe(&self) -> Subscription<ConsumerEvent> {
        self.inner.events.subscribe()
    }

    /// The configuration this consumer was built with
    pub fn config(&self) -> &ConsumerConfig {
        &self.inner.config
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.inner.control().running = false;
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queue_url", &self.inner.config.queue_url)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Polling Loop
// ============================================================================

impl ConsumerInner {
    fn control(&self) -> MutexGuard<'_, LoopControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConsumerState) {
        self.control().state = state;
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.set_state(ConsumerState::Polling);

            let messages = match self.gateway.receive_messages(&self.receive_request).await {
                Ok(messages) => messages,
                Err(error) => {
                    error!(
                        queue_url = %self.config.queue_url,
                        error = %error,
                        "Receive failed; polling halted until restarted"
                    );
                    self.halt();
                    self.events.emit(ConsumerEvent::Error(Arc::new(error)));
                    return;
                }
            };

            self.dispatch(messages).await;

            self.set_state(ConsumerState::Scheduled);
            let delay = self.config.polling_wait_time();
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            if !self.continue_polling() {
                info!(queue_url = %self.config.queue_url, "Consumer stopped");
                self.events.emit(ConsumerEvent::Stopped);
                return;
            }
        }
    }

    /// Cycle boundary: the single place the running flag is read by the loop
    fn continue_polling(&self) -> bool {
        let mut control = self.control();
        if control.running {
            return true;
        }

        control.loop_active = false;
        control.state = ConsumerState::Stopped;
        false
    }

    fn halt(&self) {
        let mut control = self.control();
        control.running = false;
        control.loop_active = false;
        control.state = ConsumerState::Stopped;
    }

    async fn dispatch(&self, messages: Vec<ReceivedMessage>) {
        if messages.is_empty() {
            debug!(queue_url = %self.config.queue_url, "Receive returned no messages");
            self.events.emit(ConsumerEvent::Empty);
            return;
        }

        self.set_state(ConsumerState::Dispatching);

        let received = messages.len();
        let outcomes = join_all(
            messages
                .into_iter()
                .map(|message| self.process_message(Arc::new(message))),
        )
        .await;
        let failed = outcomes.iter().filter(|processed| !**processed).count();

        info!(
            queue_url = %self.config.queue_url,
            received = received,
            failed = failed,
            "Receive batch processed"
        );
        self.events.emit(ConsumerEvent::ResponseProcessed);
    }

    /// Handle, then acknowledge, one message. Returns whether it was deleted.
    async fn process_message(&self, message: Arc<ReceivedMessage>) -> bool {
        self.events.emit(ConsumerEvent::MessageReceived(Arc::clone(&message)));

        match self.handle_and_delete(&message).await {
            Ok(()) => {
                debug!(message_id = ?message.message_id, "Message processed and deleted");
                self.events.emit(ConsumerEvent::MessageProcessed(message));
                true
            }
            Err(error) => {
                warn!(
                    message_id = ?message.message_id,
                    error = %error,
                    "Message processing failed; message left on queue"
                );
                self.events.emit(ConsumerEvent::ProcessingError {
                    error: Arc::new(error),
                    message,
                });
                false
            }
        }
    }

    async fn handle_and_delete(
        &self,
        message: &Arc<ReceivedMessage>,
    ) -> Result<(), ProcessingError> {
        AssertUnwindSafe(self.handler.handle(Arc::clone(message)))
            .catch_unwind()
            .await
            .map_err(|payload| ProcessingError::HandlerPanicked {
                message: panic_message(payload.as_ref()),
            })?
            .map_err(ProcessingError::Handler)?;

        self.gateway
            .delete_message(&self.config.queue_url, &message.receipt_handle)
            .await
            .map_err(ProcessingError::Delete)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
