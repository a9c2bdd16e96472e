//! # Listener Module
//!
//! Lifecycle state machine and run-loop of the queue listener.
//!
//! The run-loop executes one cycle at a time:
//!
//! 1. Publish a fresh cycle-ready signal, releasing the previous one
//! 2. Fetch one message, racing cancellation
//! 3. Empty queue: wait for the backoff delay, the ready signal or cancellation
//! 4. Message: invoke the handler, delete the message on success, continue immediately
//!
//! Handler and delete failures are logged and the loop continues. A fetch
//! failure ends the loop; it is reported by [`Listener::stop`].

use crate::backoff::{BackoffPolicy, BackoffState};
use crate::error::ListenerError;
use crate::handler::MessageHandler;
use crate::signal::{wait_first, CycleSignal, WaitOutcome};
use queue_runtime::{QueueClient, QueueError, ReceivedMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime settings of a listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// How long a fetched message stays hidden from other consumers
    pub visibility_timeout: chrono::Duration,

    /// Waits applied after empty polls
    pub backoff: BackoffPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: chrono::Duration::minutes(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

// ============================================================================
// Lifecycle Types
// ============================================================================

/// Lifecycle state of a listener
///
/// `Created -> Running -> StopRequested -> Stopped`; each transition happens at
/// most once per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Running,
    StopRequested,
    Stopped,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::StopRequested => "stop-requested",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// What [`Listener::stop`] observed while waiting for the run-loop
#[derive(Debug)]
pub enum StopOutcome {
    /// The loop exited cleanly
    Drained,

    /// The loop had already ended on a failed fetch
    Faulted(QueueError),

    /// The loop task panicked
    Panicked,

    /// The grace period elapsed before the in-flight cycle finished
    TimedOut,
}

impl StopOutcome {
    /// Check if the loop finished without a fault within the grace period
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Drained)
    }
}

struct Lifecycle {
    state: ListenerState,
    start_in_progress: bool,
    run: Option<JoinHandle<Result<(), QueueError>>>,
}

// ============================================================================
// Listener
// ============================================================================

/// Single-consumer queue listener.
///
/// Owns a background tokio task that polls the queue; the task is launched
/// by [`start`](Self::start) and drained by [`stop`](Self::stop). Dropping the
/// listener cancels the loop without waiting for it.
pub struct Listener {
    worker: Arc<Worker>,
    lifecycle: Mutex<Lifecycle>,
    disposed: AtomicBool,
}

impl Listener {
    /// Create a listener for `queue` that passes messages to `handler`
    pub fn new(
        queue: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                queue,
                handler,
                config,
                signal: CycleSignal::new(),
                cancellation: CancellationToken::new(),
                loop_exit: CancellationToken::new(),
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: ListenerState::Created,
                start_in_progress: false,
                run: None,
            }),
            disposed: AtomicBool::new(false),
        }
    }

    /// Ensure the queue exists, then launch the run-loop.
    ///
    /// Returns once the loop task has been spawned.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` if start was called before
    /// - `Disposed` after [`dispose`](Self::dispose)
    /// - `Queue` if the queue could not be created; the listener stays
    ///   `Created` and start may be retried
    pub async fn start(&self) -> Result<(), ListenerError> {
        self.ensure_not_disposed()?;

        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != ListenerState::Created || lifecycle.start_in_progress {
                return Err(ListenerError::AlreadyStarted);
            }
            lifecycle.start_in_progress = true;
        }

        let queue_name = self.worker.queue.queue_name().clone();
        match self.worker.queue.create_if_not_exists().await {
            Ok(created) => {
                debug!(queue = %queue_name, created = created, "Queue ready");
            }
            Err(e) => {
                error!(queue = %queue_name, error = %e, "Failed to ensure queue exists");
                self.lifecycle().start_in_progress = false;
                return Err(e.into());
            }
        }

        let mut lifecycle = self.lifecycle();
        lifecycle.start_in_progress = false;
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ListenerError::Disposed);
        }

        let worker = self.worker.clone();
        let exit_guard = worker.loop_exit.clone().drop_guard();
        lifecycle.run = Some(tokio::spawn(async move {
            let _exit_guard = exit_guard;
            worker.run().await
        }));
        lifecycle.state = ListenerState::Running;

        info!(
            queue = %queue_name,
            visibility_timeout_secs = self.worker.config.visibility_timeout.num_seconds(),
            "Listener started"
        );

        Ok(())
    }

    /// Request cancellation and wait for the run-loop to exit.
    ///
    /// Waits at most `timeout`; a handler still running after that is left to
    /// finish in the background. The state is `Stopped` afterwards either way.
    ///
    /// # Errors
    ///
    /// - `NotStarted` if start has not completed
    /// - `AlreadyStopped` if stop was called before
    /// - `Disposed` after [`dispose`](Self::dispose)
    pub async fn stop(&self, timeout: Duration) -> Result<StopOutcome, ListenerError> {
        self.ensure_not_disposed()?;

        let handle = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                ListenerState::Created => return Err(ListenerError::NotStarted),
                ListenerState::StopRequested | ListenerState::Stopped => {
                    return Err(ListenerError::AlreadyStopped)
                }
                ListenerState::Running => {}
            }
            lifecycle.state = ListenerState::StopRequested;
            lifecycle.run.take()
        };

        let queue_name = self.worker.queue.queue_name();
        info!(queue = %queue_name, timeout_secs = timeout.as_secs(), "Listener stop requested");

        self.worker.cancellation.cancel();
        self.worker.signal.release();

        let outcome = match handle {
            Some(mut handle) => {
                let waited = tokio::time::timeout(timeout, &mut handle).await;
                match waited {
                    Ok(Ok(Ok(()))) => StopOutcome::Drained,
                    Ok(Ok(Err(e))) => StopOutcome::Faulted(e),
                    Ok(Err(join_error)) if join_error.is_panic() => StopOutcome::Panicked,
                    Ok(Err(_)) => StopOutcome::Drained,
                    Err(_) => {
                        warn!(
                            queue = %queue_name,
                            timeout_secs = timeout.as_secs(),
                            "Listener did not finish within the stop timeout"
                        );
                        self.lifecycle().run = Some(handle);
                        StopOutcome::TimedOut
                    }
                }
            }
            None => StopOutcome::Drained,
        };

        self.lifecycle().state = ListenerState::Stopped;
        info!(queue = %queue_name, outcome = ?outcome, "Listener stopped");

        Ok(outcome)
    }

    /// Request cancellation without waiting for the run-loop
    pub fn cancel(&self) -> Result<(), ListenerError> {
        self.ensure_not_disposed()?;
        self.worker.cancellation.cancel();
        self.worker.signal.release();
        Ok(())
    }

    /// Cut a pending backoff wait short so the next fetch happens immediately.
    ///
    /// Returns `true` if the current cycle's wait signal was released.
    pub fn notify_work_ready(&self) -> Result<bool, ListenerError> {
        self.ensure_not_disposed()?;
        Ok(self.worker.signal.release())
    }

    /// Cancel the loop and release its pending wait.
    ///
    /// Idempotent; only the first call has an effect. Also runs on drop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.worker.cancellation.cancel();
        self.worker.signal.release();
        debug!(queue = %self.worker.queue.queue_name(), "Listener disposed");
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        self.lifecycle().state
    }

    /// Check if the background loop task is still running
    pub fn is_loop_active(&self) -> bool {
        self.lifecycle()
            .run
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Resolve once the background loop task has exited, for any reason.
    ///
    /// Stays pending until [`start`](Self::start) has launched the loop.
    pub async fn loop_exited(&self) {
        self.worker.loop_exit.cancelled().await
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.worker.cancellation.is_cancelled()
    }

    /// Token cancelled when the listener stops or is disposed
    pub fn cancellation_token(&self) -> CancellationToken {
        self.worker.cancellation.clone()
    }

    fn ensure_not_disposed(&self) -> Result<(), ListenerError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ListenerError::Disposed);
        }
        Ok(())
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("queue", self.worker.queue.queue_name())
            .field("state", &self.state())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

// ============================================================================
// Run-loop
// ============================================================================

/// Result of one fetch/handle/delete cycle
enum CycleOutcome {
    /// A message was found; poll again immediately
    Processed,

    /// The queue was empty; wait before polling again
    Idle {
        delay: Duration,
        ready: oneshot::Receiver<()>,
    },

    /// Cancellation was observed; leave the loop
    Cancelled,
}

/// State shared between the listener handle and its loop task
struct Worker {
    queue: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    config: ListenerConfig,
    signal: CycleSignal,
    cancellation: CancellationToken,
    /// Cancelled when the loop task ends, including by panic
    loop_exit: CancellationToken,
}

impl Worker {
    async fn run(self: Arc<Self>) -> Result<(), QueueError> {
        let mut backoff = BackoffState::new();
        let mut pending_wait = None;

        loop {
            if let Some((delay, ready)) = pending_wait.take() {
                if wait_first(delay, Some(ready), &self.cancellation).await
                    == WaitOutcome::Cancelled
                {
                    break;
                }
            }

            if self.cancellation.is_cancelled() {
                break;
            }

            match self.execute_cycle(&mut backoff).await? {
                CycleOutcome::Processed => {}
                CycleOutcome::Idle { delay, ready } => pending_wait = Some((delay, ready)),
                CycleOutcome::Cancelled => break,
            }
        }

        debug!(queue = %self.queue.queue_name(), "Listener loop exited");
        Ok(())
    }

    async fn execute_cycle(&self, backoff: &mut BackoffState) -> Result<CycleOutcome, QueueError> {
        let ready = self.signal.supersede();
        let queue_name = self.queue.queue_name();

        let fetched = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Ok(CycleOutcome::Cancelled),
            result = self.queue.receive_message(self.config.visibility_timeout) => result,
        };

        let message = match fetched {
            Ok(Some(message)) => message,
            Ok(None) => {
                let delay = backoff.record_empty(&self.config.backoff);
                info!(
                    queue = %queue_name,
                    delay_secs = delay.as_secs(),
                    empty_streak = backoff.empty_streak(),
                    "Queue empty, waiting before next poll"
                );
                return Ok(CycleOutcome::Idle { delay, ready });
            }
            Err(e) if e.is_cancellation() => {
                debug!(queue = %queue_name, "Fetch cancelled");
                return Ok(CycleOutcome::Cancelled);
            }
            Err(e) => {
                error!(
                    queue = %queue_name,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to fetch message, stopping listener loop"
                );
                return Err(e);
            }
        };

        backoff.reset();

        if self.cancellation.is_cancelled() {
            info!(
                queue = %queue_name,
                message_id = %message.message_id,
                "Cancellation requested after fetch, leaving message for redelivery"
            );
            return Ok(CycleOutcome::Cancelled);
        }

        info!(
            queue = %queue_name,
            message_id = %message.message_id,
            delivery_count = message.delivery_count,
            visibility_timeout_secs = self.config.visibility_timeout.num_seconds(),
            "Message received"
        );

        self.process(&message).await;
        Ok(CycleOutcome::Processed)
    }

    /// Hand the message to the handler and delete it on success
    async fn process(&self, message: &ReceivedMessage) {
        let queue_name = self.queue.queue_name();

        if let Err(e) = self.handler.handle(message, &self.cancellation).await {
            error!(
                queue = %queue_name,
                message_id = %message.message_id,
                error = %e,
                "Message handler failed, message will reappear after its visibility timeout"
            );
            return;
        }

        match self.queue.delete_message(&message.receipt_handle).await {
            Ok(()) => {
                info!(queue = %queue_name, message_id = %message.message_id, "Message deleted");
            }
            Err(e) => {
                error!(
                    queue = %queue_name,
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to delete processed message"
                );
            }
        }
    }
}
