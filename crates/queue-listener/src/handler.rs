//! Message handler capability.
//!
//! A [`MessageHandler`] performs the domain work for one received message.
//! Returning `Ok` lets the listener delete the message; returning an error
//! leaves it in the queue to reappear after its visibility timeout.

use async_trait::async_trait;
use queue_runtime::{QueueClient, QueueError, ReceivedMessage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

/// Default delay before a deferred message becomes visible again
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(600);

/// Errors reported by message handlers
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Processing failed: {message}")]
    Processing { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create a processing error from a description
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }
}

/// Domain work performed on one received message.
///
/// The listener never interrupts a running handler; long-running handlers
/// should watch `cancellation` and return early when it fires.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process a single message
    async fn handle(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), HandlerError>;
}

/// Handler backed by an async closure, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`]
///
/// # Examples
///
/// ```rust
/// use queue_listener::{handler_fn, HandlerError};
///
/// let handler = handler_fn(|message, _cancellation| async move {
///     let text = message
///         .body_as_str()
///         .map_err(|e| HandlerError::processing(e.to_string()))?;
///     println!("received {}", text);
///     Ok::<(), HandlerError>(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ReceivedMessage, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(ReceivedMessage, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), HandlerError> {
        (self.f)(message.clone(), cancellation.clone()).await
    }
}

/// Handler that puts every message back on its queue with a visibility delay.
///
/// The original is deleted by the listener once the copy has been added, so
/// the payload is retried after the delay rather than lost.
pub struct DeferringHandler {
    queue: Arc<dyn QueueClient>,
    delay: Duration,
}

impl DeferringHandler {
    /// Create a handler that re-adds messages to `queue` after 10 minutes
    pub fn new(queue: Arc<dyn QueueClient>) -> Self {
        Self {
            queue,
            delay: DEFAULT_REQUEUE_DELAY,
        }
    }

    /// Use a different visibility delay for re-added messages
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Visibility delay applied to re-added messages
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl std::fmt::Debug for DeferringHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferringHandler")
            .field("queue", self.queue.queue_name())
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl MessageHandler for DeferringHandler {
    async fn handle(
        &self,
        message: &ReceivedMessage,
        _cancellation: &CancellationToken,
    ) -> Result<(), HandlerError> {
        let delay = chrono::Duration::from_std(self.delay)
            .map_err(|e| HandlerError::processing(format!("requeue delay out of range: {}", e)))?;

        let requeued_id = self.queue.send_message(message.message(), delay).await?;

        info!(
            message_id = %message.message_id,
            requeued_id = %requeued_id,
            delay_secs = self.delay.as_secs(),
            "Message deferred"
        );

        Ok(())
    }
}
