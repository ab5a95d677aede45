// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{PostcodeError, PostcodeErrorCode};

const ROLLING_WINDOW: Duration = Duration::from_secs(60);
const WAIT_SLICE: Duration = Duration::from_millis(250);

/// Time source for the limiter so tests can run a minute in microseconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared stop flag checked while the limiter waits.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// At most `limit` permits in any rolling minute.
pub struct RollingMinuteLimiter {
    limit: usize,
    issued: VecDeque<Instant>,
    clock: Arc<dyn Clock>,
    cancel: CancelFlag,
}

impl RollingMinuteLimiter {
    #[must_use]
    pub fn new(limit: u32, clock: Arc<dyn Clock>, cancel: CancelFlag) -> Self {
        Self {
            limit: limit.max(1) as usize,
            issued: VecDeque::new(),
            clock,
            cancel,
        }
    }

    /// Block until a permit is free. Waiting happens in short slices so a
    /// cancellation lands between requests rather than after a full minute.
    pub fn acquire(&mut self) -> Result<Duration, PostcodeError> {
        let mut waited = Duration::ZERO;
        loop {
            if self.cancel.is_cancelled() {
                return Err(PostcodeError::new(
                    PostcodeErrorCode::Cancelled,
                    "rate-limit wait cancelled",
                ));
            }
            let now = self.clock.now();
            while self
                .issued
                .front()
                .is_some_and(|t| now.saturating_duration_since(*t) >= ROLLING_WINDOW)
            {
                self.issued.pop_front();
            }
            if self.issued.len() < self.limit {
                self.issued.push_back(now);
                return Ok(waited);
            }
            let oldest = self.issued.front().copied().unwrap_or(now);
            let remaining = ROLLING_WINDOW.saturating_sub(now.saturating_duration_since(oldest));
            if waited.is_zero() {
                tracing::info!(
                    limit = self.limit,
                    wait_ms = remaining.as_millis() as u64,
                    "postcode rate limit saturated; waiting"
                );
            }
            let slice = remaining.min(WAIT_SLICE).max(Duration::from_millis(1));
            self.clock.sleep(slice);
            waited += slice;
        }
    }

    #[must_use]
    pub fn in_window(&self) -> usize {
        self.issued.len()
    }
}
