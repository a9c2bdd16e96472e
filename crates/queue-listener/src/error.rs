//! Listener lifecycle errors.

use queue_runtime::QueueError;
use thiserror::Error;

/// Errors returned by [`Listener`](crate::Listener) lifecycle operations
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Listener has already been started")]
    AlreadyStarted,

    #[error("Listener has not been started")]
    NotStarted,

    #[error("Listener has already been stopped")]
    AlreadyStopped,

    #[error("Listener has been disposed")]
    Disposed,

    #[error("Failed to prepare queue: {0}")]
    Queue(#[from] QueueError),
}

impl ListenerError {
    /// Check if the operation was called out of order
    pub fn is_invalid_state(&self) -> bool {
        !matches!(self, Self::Queue(_))
    }

    /// Check if retrying the operation could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Queue(e) => e.is_transient(),
            _ => false,
        }
    }
}
