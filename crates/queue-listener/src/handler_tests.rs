//! Tests for message handlers.

use super::*;
use queue_runtime::{InMemoryProvider, QueueName, StandardQueueClient};

fn queue_client(provider: &Arc<InMemoryProvider>, name: &str) -> Arc<dyn QueueClient> {
    Arc::new(StandardQueueClient::new(
        provider.clone(),
        QueueName::new(name.to_string()).unwrap(),
    ))
}

async fn receive_one(queue: &Arc<dyn QueueClient>) -> ReceivedMessage {
    queue
        .receive_message(chrono::Duration::minutes(5))
        .await
        .unwrap()
        .expect("message should be visible")
}

// ============================================================================
// DeferringHandler Tests
// ============================================================================

mod deferring_handler {
    use super::*;
    use queue_runtime::Message;

    /// Verify that the default delay is ten minutes.
    #[test]
    fn test_default_delay() {
        let provider = Arc::new(InMemoryProvider::default());
        let handler = DeferringHandler::new(queue_client(&provider, "deferred"));

        assert_eq!(handler.delay(), Duration::from_secs(600));
        assert_eq!(
            handler.with_delay(Duration::from_secs(5)).delay(),
            Duration::from_secs(5)
        );
    }

    /// Verify that the body is re-added and stays hidden for the delay.
    #[tokio::test]
    async fn test_requeues_body_with_delay() {
        let provider = Arc::new(InMemoryProvider::default());
        let queue = queue_client(&provider, "deferred");
        queue.create_if_not_exists().await.unwrap();
        queue
            .send_message(Message::from_text("payload"), chrono::Duration::zero())
            .await
            .unwrap();
        let received = receive_one(&queue).await;

        let handler = DeferringHandler::new(queue.clone());
        handler
            .handle(&received, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            provider
                .approximate_message_count(queue.queue_name())
                .unwrap(),
            2,
            "original plus requeued copy"
        );

        queue.delete_message(&received.receipt_handle).await.unwrap();
        assert!(
            queue
                .receive_message(chrono::Duration::minutes(5))
                .await
                .unwrap()
                .is_none(),
            "requeued copy is invisible during the delay"
        );
    }

    /// Verify that a short delay makes the copy visible again.
    #[tokio::test]
    async fn test_requeued_copy_becomes_visible() {
        let provider = Arc::new(InMemoryProvider::default());
        let queue = queue_client(&provider, "deferred-short");
        queue.create_if_not_exists().await.unwrap();
        queue
            .send_message(Message::from_text("payload"), chrono::Duration::zero())
            .await
            .unwrap();
        let received = receive_one(&queue).await;
        queue.delete_message(&received.receipt_handle).await.unwrap();

        let handler = DeferringHandler::new(queue.clone()).with_delay(Duration::from_millis(20));
        handler
            .handle(&received, &CancellationToken::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let copy = receive_one(&queue).await;
        assert_ne!(copy.message_id, received.message_id);
        assert_eq!(copy.body_as_str().unwrap(), "payload");
    }

    /// Verify that queue failures surface as handler errors.
    #[tokio::test]
    async fn test_queue_failure_is_reported() {
        let provider = Arc::new(InMemoryProvider::default());
        let source = queue_client(&provider, "source");
        source.create_if_not_exists().await.unwrap();
        source
            .send_message(Message::from_text("payload"), chrono::Duration::zero())
            .await
            .unwrap();
        let received = receive_one(&source).await;

        let handler = DeferringHandler::new(queue_client(&provider, "missing"));
        let result = handler.handle(&received, &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(HandlerError::Queue(QueueError::QueueNotFound { .. }))
        ));
    }
}

// ============================================================================
// Closure Handler Tests
// ============================================================================

mod fn_handler {
    use super::*;
    use queue_runtime::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Verify that closures receive the message and their result is returned.
    #[tokio::test]
    async fn test_closure_handler() {
        let provider = Arc::new(InMemoryProvider::default());
        let queue = queue_client(&provider, "closures");
        queue.create_if_not_exists().await.unwrap();
        queue
            .send_message(Message::from_text("ok"), chrono::Duration::zero())
            .await
            .unwrap();
        let received = receive_one(&queue).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |message, _cancellation| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match message.body_as_str() {
                    Ok("ok") => Ok(()),
                    _ => Err(HandlerError::processing("unexpected body")),
                }
            }
        });

        handler
            .handle(&received, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Verify that anyhow errors convert into handler errors.
    #[test]
    fn test_anyhow_errors_convert() {
        let error: HandlerError = anyhow::anyhow!("downstream unavailable").into();

        assert!(matches!(error, HandlerError::Other(_)));
        assert_eq!(error.to_string(), "downstream unavailable");
    }
}
