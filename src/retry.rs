//! Bounded polling with a fixed delay between attempts.

use std::time::Duration;

use crate::constants::{MAX_READ_CYCLES, READ_PAGE_DELAY};
use crate::error::Result;

/// Something that can wait. Tests use a counting implementation.
pub trait Sleep {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Retry budget and delay of a polling loop. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: MAX_READ_CYCLES,
            delay: READ_PAGE_DELAY,
        }
    }
}

impl PollPolicy {
    /// Call `attempt` up to `self.attempts` times, sleeping `self.delay`
    /// before each call, until it yields a value.
    ///
    /// Returns the value and the number of attempts it took, or `None` once
    /// the budget is exhausted. Errors from `attempt` end the loop at once.
    pub fn poll<T, F>(&self, sleeper: &mut dyn Sleep, mut attempt: F) -> Result<Option<(T, u32)>>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        for n in 1..=self.attempts {
            sleeper.sleep(self.delay);
            if let Some(value) = attempt()? {
                return Ok(Some((value, n)));
            }
        }
        Ok(None)
    }
}
