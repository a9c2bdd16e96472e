//! Tests for in-memory queue provider.

use super::*;
use crate::provider::InMemoryConfig;

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

async fn provider_with_queue(name: &str) -> (InMemoryProvider, QueueName) {
    let provider = InMemoryProvider::default();
    let queue = queue(name);
    provider.create_queue_if_not_exists(&queue).await.unwrap();
    (provider, queue)
}

// ============================================================================
// Queue Management Tests
// ============================================================================

mod queue_management {
    use super::*;

    /// Verify that creating a queue is idempotent and reports the first creation.
    #[tokio::test]
    async fn test_create_queue_is_idempotent() {
        let provider = InMemoryProvider::default();
        let queue = queue("orders");

        assert!(provider.create_queue_if_not_exists(&queue).await.unwrap());
        assert!(!provider.create_queue_if_not_exists(&queue).await.unwrap());
        assert_eq!(provider.approximate_message_count(&queue).unwrap(), 0);
    }

    /// Verify that operations against a missing queue fail with QueueNotFound.
    #[tokio::test]
    async fn test_operations_on_missing_queue() {
        let provider = InMemoryProvider::default();
        let missing = queue("missing");

        let result = provider
            .receive_message(&missing, Duration::minutes(5))
            .await;
        assert!(matches!(result, Err(QueueError::QueueNotFound { .. })));

        let result = provider
            .send_message(&missing, &Message::from_text("x"), Duration::zero())
            .await;
        assert!(matches!(result, Err(QueueError::QueueNotFound { .. })));
    }

    /// Verify that providers do not share storage.
    #[tokio::test]
    async fn test_independent_providers() {
        let (first, queue) = provider_with_queue("shared-name").await;
        let second = InMemoryProvider::default();

        first
            .send_message(&queue, &Message::from_text("a"), Duration::zero())
            .await
            .unwrap();

        assert!(matches!(
            second.approximate_message_count(&queue),
            Err(QueueError::QueueNotFound { .. })
        ));
    }
}

// ============================================================================
// Send / Receive Tests
// ============================================================================

mod send_receive {
    use super::*;

    /// Verify that an empty queue yields None rather than an error.
    #[tokio::test]
    async fn test_receive_from_empty_queue() {
        let (provider, queue) = provider_with_queue("empty").await;

        let result = provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    /// Verify FIFO delivery and receipt metadata.
    #[tokio::test]
    async fn test_messages_delivered_in_insertion_order() {
        let (provider, queue) = provider_with_queue("fifo").await;

        let first_id = provider
            .send_message(&queue, &Message::from_text("first"), Duration::zero())
            .await
            .unwrap();
        provider
            .send_message(&queue, &Message::from_text("second"), Duration::zero())
            .await
            .unwrap();

        let received = provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap()
            .expect("message should be visible");

        assert_eq!(received.message_id, first_id);
        assert_eq!(received.body, Bytes::from("first"));
        assert_eq!(received.delivery_count, 1);
        assert_eq!(received.receipt_handle.message_id(), &first_id);
        assert_eq!(received.receipt_handle.provider_type(), ProviderType::InMemory);
        assert!(received.time_until_visible() > Duration::minutes(4));
    }

    /// Verify that a received message is hidden until its visibility timeout passes.
    #[tokio::test]
    async fn test_received_message_is_invisible_until_timeout() {
        let (provider, queue) = provider_with_queue("visibility").await;
        provider
            .send_message(&queue, &Message::from_text("only"), Duration::zero())
            .await
            .unwrap();

        let first = provider
            .receive_message(&queue, Duration::milliseconds(50))
            .await
            .unwrap()
            .unwrap();

        let hidden = provider
            .receive_message(&queue, Duration::milliseconds(50))
            .await
            .unwrap();
        assert!(hidden.is_none(), "message should be invisible");
        assert_eq!(provider.approximate_message_count(&queue).unwrap(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let again = provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap()
            .expect("message should reappear");
        assert_eq!(again.message_id, first.message_id);
        assert_eq!(again.delivery_count, 2);
        assert_ne!(
            again.receipt_handle.handle(),
            first.receipt_handle.handle(),
            "each receive issues a new pop receipt"
        );
    }

    /// Verify that a delayed send is invisible until the delay passes.
    #[tokio::test]
    async fn test_send_with_initial_visibility_delay() {
        let (provider, queue) = provider_with_queue("delayed").await;

        provider
            .send_message(
                &queue,
                &Message::from_text("later"),
                Duration::milliseconds(50),
            )
            .await
            .unwrap();

        assert!(provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap()
            .is_none());

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let received = provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap();
        assert!(received.is_some());
    }

    /// Verify that expired messages are purged.
    #[tokio::test]
    async fn test_expired_messages_are_not_delivered() {
        let (provider, queue) = provider_with_queue("ttl").await;

        provider
            .send_message(
                &queue,
                &Message::from_text("short-lived").with_ttl(Duration::milliseconds(20)),
                Duration::zero(),
            )
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap()
            .is_none());
        assert_eq!(provider.approximate_message_count(&queue).unwrap(), 0);
    }

    /// Verify that negative visibility values are rejected.
    #[tokio::test]
    async fn test_negative_visibility_timeout_rejected() {
        let (provider, queue) = provider_with_queue("negative").await;

        let result = provider
            .receive_message(&queue, Duration::seconds(-1))
            .await;
        assert!(matches!(result, Err(QueueError::ValidationError(_))));
    }
}

// ============================================================================
// Delete Tests
// ============================================================================

mod delete {
    use super::*;

    /// Verify that deleting with the current receipt removes the message.
    #[tokio::test]
    async fn test_delete_with_current_receipt() {
        let (provider, queue) = provider_with_queue("delete-ok").await;
        provider
            .send_message(&queue, &Message::from_text("done"), Duration::zero())
            .await
            .unwrap();

        let received = provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();

        provider
            .delete_message(&queue, &received.receipt_handle)
            .await
            .unwrap();

        assert_eq!(provider.approximate_message_count(&queue).unwrap(), 0);
    }

    /// Verify that a stale receipt cannot delete a re-received message.
    #[tokio::test]
    async fn test_delete_with_stale_receipt_fails() {
        let (provider, queue) = provider_with_queue("delete-stale").await;
        provider
            .send_message(&queue, &Message::from_text("contended"), Duration::zero())
            .await
            .unwrap();

        let stale = provider
            .receive_message(&queue, Duration::zero())
            .await
            .unwrap()
            .unwrap();
        let current = provider
            .receive_message(&queue, Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();

        let result = provider.delete_message(&queue, &stale.receipt_handle).await;
        assert!(matches!(result, Err(QueueError::MessageNotFound { .. })));

        provider
            .delete_message(&queue, &current.receipt_handle)
            .await
            .unwrap();
        assert_eq!(provider.approximate_message_count(&queue).unwrap(), 0);
    }
}

// ============================================================================
// Limits Tests
// ============================================================================

mod limits {
    use super::*;

    /// Verify that the configured capacity is enforced.
    #[tokio::test]
    async fn test_queue_capacity_enforced() {
        let provider = InMemoryProvider::new(InMemoryConfig {
            max_queue_size: 2,
            default_message_ttl_seconds: None,
        });
        let queue = queue("bounded");
        provider.create_queue_if_not_exists(&queue).await.unwrap();

        for body in ["a", "b"] {
            provider
                .send_message(&queue, &Message::from_text(body), Duration::zero())
                .await
                .unwrap();
        }

        let result = provider
            .send_message(&queue, &Message::from_text("c"), Duration::zero())
            .await;
        assert!(matches!(
            result,
            Err(QueueError::QueueFull { capacity: 2, .. })
        ));
    }

    /// Verify that oversized bodies are rejected.
    #[tokio::test]
    async fn test_message_size_enforced() {
        let (provider, queue) = provider_with_queue("sized").await;
        let body = Bytes::from(vec![b'x'; ProviderType::InMemory.max_message_size() + 1]);

        let result = provider
            .send_message(&queue, &Message::new(body), Duration::zero())
            .await;
        assert!(matches!(result, Err(QueueError::MessageTooLarge { .. })));
    }

    /// Verify that durations past the calendar range are rejected instead of overflowing.
    #[tokio::test]
    async fn test_unrepresentable_durations_rejected() {
        let (provider, queue) = provider_with_queue("far-future").await;
        let millennia = Duration::days(365 * 1_000_000);

        let delayed = provider
            .send_message(&queue, &Message::from_text("x"), millennia)
            .await;
        assert!(matches!(
            delayed,
            Err(QueueError::ValidationError(ValidationError::OutOfRange { ref field, .. }))
                if field == "initial_visibility_delay"
        ));

        let long_lived = provider
            .send_message(
                &queue,
                &Message::from_text("x").with_ttl(millennia),
                Duration::zero(),
            )
            .await;
        assert!(matches!(
            long_lived,
            Err(QueueError::ValidationError(ValidationError::OutOfRange { ref field, .. }))
                if field == "time_to_live"
        ));
        assert_eq!(provider.approximate_message_count(&queue).unwrap(), 0);

        provider
            .send_message(&queue, &Message::from_text("ok"), Duration::zero())
            .await
            .unwrap();
        let hidden = provider.receive_message(&queue, millennia).await;
        assert!(matches!(
            hidden,
            Err(QueueError::ValidationError(ValidationError::OutOfRange { ref field, .. }))
                if field == "visibility_timeout"
        ));
        assert!(provider
            .receive_message(&queue, Duration::seconds(30))
            .await
            .unwrap()
            .is_some());
    }

    /// Verify that a default TTL beyond the signed range is reported, not wrapped.
    #[tokio::test]
    async fn test_oversized_default_ttl_rejected() {
        let provider = InMemoryProvider::new(InMemoryConfig {
            max_queue_size: 10,
            default_message_ttl_seconds: Some(u64::MAX),
        });
        let queue = queue("oversized-ttl");
        provider.create_queue_if_not_exists(&queue).await.unwrap();

        let result = provider
            .send_message(&queue, &Message::from_text("x"), Duration::zero())
            .await;
        assert!(matches!(
            result,
            Err(QueueError::ValidationError(ValidationError::OutOfRange { ref field, .. }))
                if field == "default_message_ttl_seconds"
        ));
    }
}
