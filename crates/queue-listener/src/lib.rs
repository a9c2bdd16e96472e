//! # Queue Listener
//!
//! Long-running consumer that polls one durable queue, hands each message to a
//! [`MessageHandler`], deletes it on success and backs off while the queue is
//! empty.
//!
//! The [`Listener`] runs a single background task per instance. Cycles are
//! strictly sequential: at most one fetch, handle and delete sequence is in
//! flight at any time. Failures while handling or deleting a message are logged
//! and the message is left to reappear after its visibility timeout. A failed
//! fetch ends the loop, and [`Listener::stop`] reports it through
//! [`StopOutcome::Faulted`].
//!
//! ## Module Organization
//!
//! - [`listener`] - Lifecycle state machine and run-loop
//! - [`backoff`] - Empty-queue backoff policy
//! - [`handler`] - Message handler capability and the deferring handler
//! - [`signal`] - Cycle-ready handoff and cancellable waits
//! - [`error`] - Lifecycle errors
//!
//! ## Example
//!
//! ```no_run
//! use queue_listener::{DeferringHandler, Listener, ListenerConfig};
//! use queue_runtime::{QueueClientFactory, QueueName};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = QueueClientFactory::create_test_client(QueueName::new("work-items".to_string())?);
//! let handler = Arc::new(DeferringHandler::new(queue.clone()));
//!
//! let listener = Listener::new(queue, handler, ListenerConfig::default());
//! listener.start().await?;
//!
//! // ... later, on shutdown
//! let outcome = listener.stop(Duration::from_secs(30)).await?;
//! println!("listener stopped: {:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod handler;
pub mod listener;
pub mod signal;

pub use backoff::{BackoffPolicy, BackoffState};
pub use error::ListenerError;
pub use handler::{handler_fn, DeferringHandler, FnHandler, HandlerError, MessageHandler};
pub use listener::{Listener, ListenerConfig, ListenerState, StopOutcome};
pub use tokio_util::sync::CancellationToken;
