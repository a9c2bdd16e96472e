//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue implementation that
//! mirrors storage-queue semantics:
//! - Received messages stay in the queue, hidden until their visibility timeout passes
//! - Every receive issues a fresh pop receipt; deletes must present the latest one
//! - Messages can be sent with an initial visibility delay
//! - Expired messages (TTL) are purged on access
//!
//! This provider is intended for:
//! - Unit testing of queue consumers
//! - Development and prototyping
//! - Reference implementation for cloud providers

use crate::client::QueueProvider;
use crate::error::{QueueError, ValidationError};
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    fn queue_mut(&mut self, queue_name: &QueueName) -> Result<&mut InMemoryQueue, QueueError> {
        self.queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })
    }
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Messages in insertion order, visible or not
    messages: VecDeque<StoredMessage>,
}

impl InMemoryQueue {
    fn purge_expired(&mut self) {
        self.messages.retain(|message| !message.is_expired());
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    inserted_at: Timestamp,
    available_at: Timestamp,
    expires_at: Option<Timestamp>,
    dequeue_count: u32,
    pop_receipt: Option<String>,
}

impl StoredMessage {
    fn from_message(
        message: &Message,
        message_id: MessageId,
        initial_visibility_delay: Duration,
        default_ttl: Option<Duration>,
    ) -> Result<Self, ValidationError> {
        let now = Timestamp::now();
        let expires_at = match message.time_to_live.or(default_ttl) {
            Some(ttl) => Some(offset_from(&now, "time_to_live", ttl)?),
            None => None,
        };
        let available_at = offset_from(&now, "initial_visibility_delay", initial_visibility_delay)?;

        Ok(Self {
            message_id,
            body: message.body.clone(),
            inserted_at: now,
            available_at,
            expires_at,
            dequeue_count: 0,
            pop_receipt: None,
        })
    }

    /// Check if message is expired based on TTL
    fn is_expired(&self) -> bool {
        if let Some(ref expires_at) = self.expires_at {
            Timestamp::now() >= *expires_at
        } else {
            false
        }
    }

    /// Check if message is available for receiving
    fn is_available(&self) -> bool {
        Timestamp::now() >= self.available_at
    }
}

fn validate_delay(field: &str, delay: Duration) -> Result<(), ValidationError> {
    if delay < Duration::zero() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: "must not be negative".to_string(),
        });
    }
    Ok(())
}

/// `now` moved forward by `duration`, rejecting offsets past the calendar range
fn offset_from(
    now: &Timestamp,
    field: &str,
    duration: Duration,
) -> Result<Timestamp, ValidationError> {
    now.checked_add(duration)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("{} seconds is too far in the future", duration.num_seconds()),
        })
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
        }
    }

    /// Number of messages held by `queue`, visible or not
    pub fn approximate_message_count(&self, queue: &QueueName) -> Result<usize, QueueError> {
        let storage = self.read_storage()?;
        storage
            .queues
            .get(queue)
            .map(|q| q.messages.iter().filter(|m| !m.is_expired()).count())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
    }

    fn read_storage(&self) -> Result<RwLockReadGuard<'_, QueueStorage>, QueueError> {
        self.storage.read().map_err(|_| lock_poisoned())
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| lock_poisoned())
    }
}

fn lock_poisoned() -> QueueError {
    QueueError::ProviderError {
        provider: ProviderType::InMemory.to_string(),
        code: "LockPoisoned".to_string(),
        message: "queue storage lock poisoned by a panicking writer".to_string(),
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl std::fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, QueueError> {
        let mut storage = self.write_storage()?;
        if storage.queues.contains_key(queue) {
            return Ok(false);
        }

        storage.queues.insert(queue.clone(), InMemoryQueue::default());
        Ok(true)
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        validate_delay("visibility_timeout", visibility_timeout)?;
        let available_at =
            offset_from(&Timestamp::now(), "visibility_timeout", visibility_timeout)?;

        let mut storage = self.write_storage()?;
        let queue_state = storage.queue_mut(queue)?;
        queue_state.purge_expired();

        let Some(stored) = queue_state.messages.iter_mut().find(|m| m.is_available()) else {
            return Ok(None);
        };

        let pop_receipt = uuid::Uuid::new_v4().to_string();
        stored.dequeue_count += 1;
        stored.available_at = available_at;
        stored.pop_receipt = Some(pop_receipt.clone());

        let receipt_handle = ReceiptHandle::new(
            stored.message_id.clone(),
            pop_receipt,
            ProviderType::InMemory,
        );

        Ok(Some(ReceivedMessage {
            message_id: stored.message_id.clone(),
            body: stored.body.clone(),
            receipt_handle,
            delivery_count: stored.dequeue_count,
            inserted_at: stored.inserted_at.clone(),
            next_visible_at: stored.available_at.clone(),
        }))
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.write_storage()?;
        let queue_state = storage.queue_mut(queue)?;

        let position = queue_state.messages.iter().position(|m| {
            &m.message_id == receipt.message_id()
                && m.pop_receipt.as_deref() == Some(receipt.handle())
        });

        match position {
            Some(index) => {
                queue_state.messages.remove(index);
                Ok(())
            }
            None => Err(QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            }),
        }
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
        initial_visibility_delay: Duration,
    ) -> Result<MessageId, QueueError> {
        validate_delay("initial_visibility_delay", initial_visibility_delay)?;

        let max_size = self.provider_type().max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            });
        }

        let mut storage = self.write_storage()?;
        let capacity = storage.config.max_queue_size;
        let default_ttl = storage
            .config
            .default_message_ttl_seconds
            .map(|secs| {
                i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .ok_or_else(|| ValidationError::OutOfRange {
                        field: "default_message_ttl_seconds".to_string(),
                        message: format!("{} seconds cannot be represented", secs),
                    })
            })
            .transpose()?;

        let queue_state = storage.queue_mut(queue)?;
        queue_state.purge_expired();

        if queue_state.messages.len() >= capacity {
            return Err(QueueError::QueueFull {
                queue_name: queue.to_string(),
                capacity,
            });
        }

        let message_id = MessageId::new();
        let stored = StoredMessage::from_message(
            message,
            message_id.clone(),
            initial_visibility_delay,
            default_ttl,
        )?;
        queue_state.messages.push_back(stored);

        Ok(message_id)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
