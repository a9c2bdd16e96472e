//! # Backoff Module
//!
//! Computes how long the listener waits after polling an empty queue.
//!
//! The wait grows linearly with the number of consecutive empty polls and is
//! capped: `base_delay + step * min(empty_streak, max_steps)`. With the default
//! policy the waits are 60s, 70s, 80s, 80s, ...

use std::time::Duration;

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

/// Backoff policy applied between empty polls
///
/// # Examples
///
/// ```rust
/// use queue_listener::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::default();
/// assert_eq!(policy.delay_for(0), Duration::from_secs(60));
/// assert_eq!(policy.delay_for(5), Duration::from_secs(80));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait after the first empty poll
    pub base_delay: Duration,

    /// Extra wait added per consecutive empty poll
    pub step: Duration,

    /// Number of steps after which the wait stops growing
    pub max_steps: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            step: Duration::from_secs(10),
            max_steps: 2,
        }
    }
}

impl BackoffPolicy {
    /// Create a new backoff policy
    pub fn new(base_delay: Duration, step: Duration, max_steps: u32) -> Self {
        Self {
            base_delay,
            step,
            max_steps,
        }
    }

    /// Wait for a given number of preceding empty polls
    pub fn delay_for(&self, empty_streak: u32) -> Duration {
        let steps = empty_streak.min(self.max_steps);
        self.base_delay
            .saturating_add(self.step.saturating_mul(steps))
    }

    /// Longest wait this policy produces
    pub fn max_delay(&self) -> Duration {
        self.delay_for(self.max_steps)
    }
}

/// Consecutive empty-poll counter owned by the run-loop
///
/// Bounded by the policy's `max_steps`; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffState {
    empty_streak: u32,
}

impl BackoffState {
    /// Create a state with no empty polls recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of consecutive empty polls, capped
    pub fn empty_streak(&self) -> u32 {
        self.empty_streak
    }

    /// Record an empty poll and return the wait before the next one.
    ///
    /// The wait is computed from the streak as it stood before this poll.
    pub fn record_empty(&mut self, policy: &BackoffPolicy) -> Duration {
        let delay = policy.delay_for(self.empty_streak);
        if self.empty_streak < policy.max_steps {
            self.empty_streak += 1;
        }
        delay
    }

    /// Forget previous empty polls after a message was found
    pub fn reset(&mut self) {
        self.empty_streak = 0;
    }
}
