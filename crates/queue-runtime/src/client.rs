//! Client traits and implementations for queue operations.

use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
use crate::providers::{AzureStorageQueueProvider, InMemoryProvider};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Operations against a single durable queue.
///
/// This is the capability a consumer works with: it is bound to one queue, so
/// callers never pass queue names around.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Name of the queue this client is bound to
    fn queue_name(&self) -> &QueueName;

    /// Create the queue if it does not exist yet.
    ///
    /// Returns `true` when the queue was created by this call.
    async fn create_if_not_exists(&self) -> Result<bool, QueueError>;

    /// Receive at most one visible message.
    ///
    /// The message is hidden from other consumers for `visibility_timeout`.
    /// An empty queue yields `Ok(None)`, not an error.
    async fn receive_message(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Remove a message the caller has finished with
    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Add a message that stays invisible for `initial_visibility_delay`
    async fn send_message(
        &self,
        message: Message,
        initial_visibility_delay: Duration,
    ) -> Result<MessageId, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Interface implemented by specific queue providers (Azure, in-memory, etc.)
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Create queue if missing, returning whether it was created
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, QueueError>;

    /// Receive single message
    async fn receive_message(
        &self,
        queue: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Delete message by receipt
    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Send single message with an initial visibility delay
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
        initial_visibility_delay: Duration,
    ) -> Result<MessageId, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create a client for `queue` from configuration
    pub fn create_client(
        config: &QueueConfig,
        queue: QueueName,
    ) -> Result<Arc<dyn QueueClient>, QueueError> {
        let provider: Arc<dyn QueueProvider> = match &config.provider {
            ProviderConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryProvider::new(in_memory_config.clone()))
            }
            ProviderConfig::AzureStorageQueue(azure_config) => {
                Arc::new(AzureStorageQueueProvider::new(azure_config.clone())?)
            }
        };

        Ok(Arc::new(StandardQueueClient::new(provider, queue)))
    }

    /// Create test client with in-memory provider
    pub fn create_test_client(queue: QueueName) -> Arc<dyn QueueClient> {
        let provider = InMemoryProvider::new(InMemoryConfig::default());
        Arc::new(StandardQueueClient::new(Arc::new(provider), queue))
    }
}

/// Standard queue client implementation binding a provider to one queue
#[derive(Clone)]
pub struct StandardQueueClient {
    provider: Arc<dyn QueueProvider>,
    queue: QueueName,
}

impl StandardQueueClient {
    /// Create new standard queue client with provider
    pub fn new(provider: Arc<dyn QueueProvider>, queue: QueueName) -> Self {
        Self { provider, queue }
    }
}

impl std::fmt::Debug for StandardQueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardQueueClient")
            .field("queue", &self.queue)
            .field("provider", &self.provider.provider_type())
            .finish()
    }
}

#[async_trait]
impl QueueClient for StandardQueueClient {
    fn queue_name(&self) -> &QueueName {
        &self.queue
    }

    async fn create_if_not_exists(&self) -> Result<bool, QueueError> {
        self.provider.create_queue_if_not_exists(&self.queue).await
    }

    async fn receive_message(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        self.provider
            .receive_message(&self.queue, visibility_timeout)
            .await
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.provider.delete_message(&self.queue, receipt).await
    }

    async fn send_message(
        &self,
        message: Message,
        initial_visibility_delay: Duration,
    ) -> Result<MessageId, QueueError> {
        self.provider
            .send_message(&self.queue, &message, initial_visibility_delay)
            .await
    }

    fn provider_type(&self) -> ProviderType {
        self.provider.provider_type()
    }
}
