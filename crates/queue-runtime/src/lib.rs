//! # Queue Runtime
//!
//! Provider-agnostic access to durable storage queues, with an Azure Storage
//! Queue implementation and an in-memory implementation for tests and local
//! development.
//!
//! The model follows storage-queue semantics:
//! - A received message is hidden for a visibility timeout, not removed
//! - Deleting a message requires the receipt issued by the latest receive
//! - Messages can be added with an initial visibility delay
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Client traits and the client factory
//! - [`providers`] - Concrete provider implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

pub use client::{QueueClient, QueueClientFactory, QueueProvider, StandardQueueClient};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
pub use provider::{
    AzureStorageQueueConfig, InMemoryConfig, ProviderConfig, ProviderType, QueueConfig,
};
pub use providers::{AzureStorageQueueProvider, InMemoryProvider};
