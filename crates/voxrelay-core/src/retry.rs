//! Bounded retry with exponential backoff.
//!
//! The state is explicit and clock-free: callers ask for the next delay and
//! do the sleeping themselves.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 0,
        }
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(failures.saturating_sub(1) as i32);
        let nanos = (self.initial_delay.as_nanos() as f64 * factor).min(u64::MAX as f64);
        Duration::from_nanos(nanos as u64).min(self.max_delay)
    }
}

/// Progress through a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Attempts made so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record the start of an attempt. Returns false once the budget is spent.
    pub fn begin_attempt(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.attempt += 1;
        true
    }

    /// After a failed attempt: the delay before the next one, or `None` when exhausted.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.is_exhausted() {
            None
        } else {
            Some(self.policy.delay_for(self.attempt))
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }
}
