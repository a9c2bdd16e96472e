//! Tests for queue client traits and implementations.

use super::*;
use crate::provider::AzureStorageQueueConfig;

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

// ============================================================================
// Contract Tests - QueueClient Trait
// ============================================================================

/// Run the storage-queue contract against any client implementation
async fn assert_queue_client_contract(client: &dyn QueueClient) {
    // Arrange
    assert!(client.create_if_not_exists().await.unwrap());
    assert!(!client.create_if_not_exists().await.unwrap());

    // Act
    let message_id = client
        .send_message(Message::from_text("payload"), Duration::zero())
        .await
        .unwrap();
    let received = client
        .receive_message(Duration::minutes(5))
        .await
        .unwrap()
        .expect("sent message should be visible");

    // Assert
    assert_eq!(received.message_id, message_id);
    assert_eq!(received.body_as_str().unwrap(), "payload");
    assert!(client
        .receive_message(Duration::minutes(5))
        .await
        .unwrap()
        .is_none());

    client
        .delete_message(&received.receipt_handle)
        .await
        .unwrap();
    assert!(matches!(
        client.delete_message(&received.receipt_handle).await,
        Err(QueueError::MessageNotFound { .. })
    ));
}

mod standard_client {
    use super::*;

    /// Verify that the standard client honors the queue contract over the in-memory provider.
    #[tokio::test]
    async fn test_in_memory_contract() {
        let client = StandardQueueClient::new(Arc::new(InMemoryProvider::default()), queue("contract"));
        assert_queue_client_contract(&client).await;
    }

    /// Verify that the client is bound to its queue.
    #[tokio::test]
    async fn test_client_is_bound_to_queue() {
        let provider = Arc::new(InMemoryProvider::default());
        let orders = StandardQueueClient::new(provider.clone(), queue("orders"));
        let invoices = StandardQueueClient::new(provider.clone(), queue("invoices"));
        orders.create_if_not_exists().await.unwrap();
        invoices.create_if_not_exists().await.unwrap();

        orders
            .send_message(Message::from_text("order"), Duration::zero())
            .await
            .unwrap();

        assert_eq!(orders.queue_name().as_str(), "orders");
        assert!(invoices
            .receive_message(Duration::minutes(5))
            .await
            .unwrap()
            .is_none());
        assert_eq!(provider.approximate_message_count(&queue("orders")).unwrap(), 1);
    }

    /// Verify that debug output names queue and provider.
    #[test]
    fn test_debug_output() {
        let client = StandardQueueClient::new(Arc::new(InMemoryProvider::default()), queue("debug"));
        let rendered = format!("{:?}", client);

        assert!(rendered.contains("debug"));
        assert!(rendered.contains("InMemory"));
    }
}

// ============================================================================
// Factory Tests
// ============================================================================

mod factory {
    use super::*;

    /// Verify that the default configuration yields an in-memory client.
    #[tokio::test]
    async fn test_create_in_memory_client() {
        let client =
            QueueClientFactory::create_client(&QueueConfig::default(), queue("factory")).unwrap();

        assert_eq!(client.provider_type(), ProviderType::InMemory);
        assert_queue_client_contract(client.as_ref()).await;
    }

    /// Verify that the test client is backed by memory.
    #[test]
    fn test_create_test_client() {
        let client = QueueClientFactory::create_test_client(queue("test-client"));

        assert_eq!(client.provider_type(), ProviderType::InMemory);
        assert_eq!(client.queue_name().as_str(), "test-client");
    }

    /// Verify that an Azure configuration yields an Azure client without network access.
    #[test]
    fn test_create_azure_client() {
        let config = QueueConfig {
            provider: ProviderConfig::AzureStorageQueue(
                AzureStorageQueueConfig::from_connection_string("UseDevelopmentStorage=true"),
            ),
        };

        let client = QueueClientFactory::create_client(&config, queue("azure")).unwrap();

        assert_eq!(client.provider_type(), ProviderType::AzureStorageQueue);
    }

    /// Verify that an unusable connection string is rejected up front.
    #[test]
    fn test_create_azure_client_with_bad_connection_string() {
        let config = QueueConfig {
            provider: ProviderConfig::AzureStorageQueue(
                AzureStorageQueueConfig::from_connection_string("AccountName=acct"),
            ),
        };

        let result = QueueClientFactory::create_client(&config, queue("azure"));

        assert!(matches!(result, Err(QueueError::ConfigurationError(_))));
    }
}
