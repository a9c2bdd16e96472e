//! Provider types and configuration.

use serde::{Deserialize, Serialize};

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AzureStorageQueue,
    InMemory,
}

impl ProviderType {
    /// Get maximum message size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AzureStorageQueue => 64 * 1024, // 64KB of encoded text
            Self::InMemory => 10 * 1024 * 1024,   // 10MB
        }
    }

    /// Longest visibility timeout the provider accepts, in seconds
    pub fn max_visibility_timeout_seconds(&self) -> i64 {
        match self {
            Self::AzureStorageQueue => 7 * 24 * 60 * 60, // 7 days
            Self::InMemory => i64::from(u32::MAX),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AzureStorageQueue => write!(f, "AzureStorageQueue"),
            Self::InMemory => write!(f, "InMemory"),
        }
    }
}

/// Configuration for queue client initialization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    pub provider: ProviderConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderConfig {
    AzureStorageQueue(AzureStorageQueueConfig),
    InMemory(InMemoryConfig),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::InMemory(InMemoryConfig::default())
    }
}

/// Azure Storage Queue configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AzureStorageQueueConfig {
    /// Storage account connection string
    pub connection_string: String,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl AzureStorageQueueConfig {
    /// Create configuration from a connection string with default timeouts
    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

// The connection string embeds the account key.
impl std::fmt::Debug for AzureStorageQueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureStorageQueueConfig")
            .field("connection_string", &"<redacted>")
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

fn default_request_timeout_seconds() -> u64 {
    30
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    pub max_queue_size: usize,
    /// Lifetime applied to messages sent without an explicit TTL
    pub default_message_ttl_seconds: Option<u64>,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10000,
            default_message_ttl_seconds: None,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
