// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Suspends the crawl between requests. Tests substitute a recorder.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Exponential delay from `base`, doubling per attempt, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration) -> Self {
        Self {
            base: base.max(Duration::from_millis(1)),
            max: MAX_BACKOFF,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let b = Backoff::new(Duration::from_secs(1));
        assert_eq!(b.delay(0), Duration::from_secs(1));
        assert_eq!(b.delay(3), Duration::from_secs(8));
        assert_eq!(b.delay(6), MAX_BACKOFF);
        assert_eq!(b.delay(40), MAX_BACKOFF);
    }
}
