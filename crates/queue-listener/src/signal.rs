//! Cycle-ready handoff and cancellable waits.
//!
//! Each listener cycle publishes a fresh one-shot "ready" signal. A backoff wait
//! ends on whichever comes first: its timer, that ready signal, or
//! cancellation. Releasing the signal (on stop, dispose or an explicit
//! work-ready notification) cuts the pending wait short.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;

/// Single-slot handoff holding the ready signal of the current cycle
#[derive(Debug, Default)]
pub struct CycleSignal {
    slot: Mutex<Option<oneshot::Sender<()>>>,
}

impl CycleSignal {
    /// Create an empty handoff
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new ready signal, releasing the one it replaces.
    ///
    /// Returns the receiving half for the caller's next wait.
    pub fn supersede(&self) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(sender);

        if let Some(previous) = previous {
            let _ = previous.send(());
        }

        receiver
    }

    /// Release the current ready signal.
    ///
    /// Returns `true` if a waiter was still holding it.
    pub fn release(&self) -> bool {
        let current = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match current {
            Some(sender) => sender.send(()).is_ok(),
            None => false,
        }
    }
}

/// What ended a [`wait_first`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The timer ran out
    Elapsed,
    /// The ready signal fired or its sender was dropped
    Ready,
    /// Cancellation was requested
    Cancelled,
}

/// Wait for the earliest of `delay`, the `ready` signal and cancellation.
///
/// Cancellation wins ties, including when it was requested before the call.
pub async fn wait_first(
    delay: Duration,
    ready: Option<oneshot::Receiver<()>>,
    cancellation: &CancellationToken,
) -> WaitOutcome {
    if cancellation.is_cancelled() {
        return WaitOutcome::Cancelled;
    }

    let ready = async move {
        match ready {
            Some(receiver) => {
                let _ = receiver.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => WaitOutcome::Cancelled,
        _ = ready => WaitOutcome::Ready,
        _ = tokio::time::sleep(delay) => WaitOutcome::Elapsed,
    }
}
