//! Common test utilities for queue listener integration tests
//!
//! This module provides:
//! - A recording message handler with scripted failures
//! - Helpers for building in-memory queues and fast listener settings
//! - Polling helpers for asynchronous assertions

use async_trait::async_trait;
use queue_listener::{
    BackoffPolicy, CancellationToken, HandlerError, ListenerConfig, MessageHandler,
};
use queue_runtime::{
    InMemoryProvider, Message, MessageId, QueueClient, QueueName, ReceivedMessage,
    StandardQueueClient,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Recording Handler
// ============================================================================

/// A message seen by [`RecordingHandler`]
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct HandledMessage {
    pub message_id: MessageId,
    pub body: String,
    pub delivery_count: u32,
}

/// Handler that records every message and fails on request
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingHandler {
    handled: Arc<Mutex<Vec<HandledMessage>>>,
    failures_remaining: Arc<Mutex<HashMap<String, u32>>>,
    processing_time: Option<Duration>,
}

impl RecordingHandler {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` deliveries of messages with `body`
    #[allow(dead_code)]
    pub fn fail_times(self, body: &str, times: u32) -> Self {
        self.failures_remaining
            .lock()
            .unwrap()
            .insert(body.to_string(), times);
        self
    }

    /// Spend `duration` on every message
    #[allow(dead_code)]
    pub fn with_processing_time(mut self, duration: Duration) -> Self {
        self.processing_time = Some(duration);
        self
    }

    #[allow(dead_code)]
    pub fn handled(&self) -> Vec<HandledMessage> {
        self.handled.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn bodies(&self) -> Vec<String> {
        self.handled().into_iter().map(|m| m.body).collect()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(
        &self,
        message: &ReceivedMessage,
        _cancellation: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let body = message
            .body_as_str()
            .map_err(|e| HandlerError::processing(e.to_string()))?
            .to_string();

        if let Some(duration) = self.processing_time {
            tokio::time::sleep(duration).await;
        }

        self.handled.lock().unwrap().push(HandledMessage {
            message_id: message.message_id.clone(),
            body: body.clone(),
            delivery_count: message.delivery_count,
        });

        let mut failures = self.failures_remaining.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&body) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HandlerError::processing(format!("scripted failure for {}", body)));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Queue Helpers
// ============================================================================

#[allow(dead_code)]
pub fn queue_name(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

/// Client for `name` on a shared in-memory provider
#[allow(dead_code)]
pub fn in_memory_queue(provider: &Arc<InMemoryProvider>, name: &str) -> Arc<dyn QueueClient> {
    Arc::new(StandardQueueClient::new(provider.clone(), queue_name(name)))
}

/// Create the queue and add one message per body
#[allow(dead_code)]
pub async fn seed(queue: &Arc<dyn QueueClient>, bodies: &[&str]) {
    queue.create_if_not_exists().await.unwrap();
    for body in bodies {
        queue
            .send_message(Message::from_text(*body), chrono::Duration::zero())
            .await
            .unwrap();
    }
}

/// Listener settings that keep real-time tests short
#[allow(dead_code)]
pub fn fast_config() -> ListenerConfig {
    ListenerConfig {
        visibility_timeout: chrono::Duration::seconds(1),
        backoff: BackoffPolicy::new(Duration::from_millis(50), Duration::from_millis(10), 2),
    }
}

/// Poll `condition` until it holds, panicking after `timeout`
#[allow(dead_code)]
pub async fn wait_until<F>(timeout: Duration, description: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", description);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
