//! Tests for the event channel.

use super::*;
use crate::message::ReceiptHandle;

// ============================================================================
// Event Channel Tests
// ============================================================================

mod event_channel_tests {
    use super::*;

    /// Verify emitting without subscribers succeeds and reaches nobody
    #[test]
    fn test_emit_without_subscribers() {
        let channel: EventChannel<ConsumerEvent> = EventChannel::default();
        assert_eq!(channel.emit(ConsumerEvent::Empty), 0);
        assert_eq!(channel.subscriber_count(), 0);
    }

    /// Verify every subscriber sees every event in emission order
    #[tokio::test]
    async fn test_multiple_subscribers_receive_in_order() {
        let channel: EventChannel<ConsumerEvent> = EventChannel::new(16);
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        assert_eq!(channel.emit(ConsumerEvent::Empty), 2);
        channel.emit(ConsumerEvent::Stopped);

        for subscription in [&mut first, &mut second] {
            assert_eq!(subscription.recv().await.unwrap().kind(), "empty");
            assert_eq!(subscription.recv().await.unwrap().kind(), "stopped");
        }
    }

    /// Verify subscribers only see events emitted after subscribing
    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let channel: EventChannel<ConsumerEvent> = EventChannel::new(16);
        channel.emit(ConsumerEvent::Empty);

        let mut subscription = channel.subscribe();
        assert!(subscription.try_recv().is_none());
    }

    /// Verify unsubscribing removes the subscriber
    #[test]
    fn test_unsubscribe() {
        let channel: EventChannel<ConsumerEvent> = EventChannel::new(16);
        let subscription = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);

        subscription.unsubscribe();
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.emit(ConsumerEvent::Empty), 0);
    }

    /// Verify a lagging subscriber skips the oldest events instead of blocking
    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let channel: EventChannel<ProducerEvent> = EventChannel::new(2);
        let mut subscription = channel.subscribe();

        for successful_count in 0..5 {
            channel.emit(ProducerEvent::Completed { successful_count });
        }

        match subscription.recv().await {
            Some(ProducerEvent::Completed { successful_count }) => assert_eq!(successful_count, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    /// Verify recv ends once the channel is dropped and drained
    #[tokio::test]
    async fn test_recv_returns_none_after_close() {
        let channel: EventChannel<ConsumerEvent> = EventChannel::new(4);
        let mut subscription = channel.subscribe();
        channel.emit(ConsumerEvent::Empty);
        drop(channel);

        assert!(subscription.recv().await.is_some());
        assert!(subscription.recv().await.is_none());
    }
}

// ============================================================================
// Event Kind Tests
// ============================================================================

mod event_kind_tests {
    use super::*;

    /// Verify consumer event names
    #[test]
    fn test_consumer_event_kinds() {
        let message = Arc::new(ReceivedMessage::new(ReceiptHandle::generate(), "body"));

        assert_eq!(
            ConsumerEvent::MessageReceived(Arc::clone(&message)).kind(),
            "message_received"
        );
        assert_eq!(
            ConsumerEvent::MessageProcessed(Arc::clone(&message)).kind(),
            "message_processed"
        );
        assert_eq!(
            ConsumerEvent::ProcessingError {
                error: Arc::new(ProcessingError::Handler("x".into())),
                message,
            }
            .kind(),
            "processing_error"
        );
        assert_eq!(ConsumerEvent::ResponseProcessed.kind(), "response_processed");
        assert_eq!(ConsumerEvent::Empty.kind(), "empty");
        assert_eq!(
            ConsumerEvent::Error(Arc::new(QueueError::ConnectionFailed {
                message: "down".to_string()
            }))
            .kind(),
            "error"
        );
        assert_eq!(ConsumerEvent::Stopped.kind(), "stopped");
    }

    /// Verify producer event names
    #[test]
    fn test_producer_event_kinds() {
        assert_eq!(
            ProducerEvent::ChunkSent {
                chunk_index: 0,
                entry_count: 1,
                successful_count: 1,
                failed: Vec::new(),
            }
            .kind(),
            "chunk_sent"
        );
        assert_eq!(
            ProducerEvent::Completed {
                successful_count: 1
            }
            .kind(),
            "completed"
        );
        assert_eq!(
            ProducerEvent::PartialFailure {
                failed_ids: vec!["a".to_string()]
            }
            .kind(),
            "partial_failure"
        );
    }
}
