//! Call-rate limiting for the screening API
//!
//! Sliding-window limiter shared by every in-flight screening task:
//! at most `rate` acquisitions complete inside any rolling window of
//! `window` (one second by default), whatever the number of callers.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter shared across screening tasks
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum grants per window (also the burst size)
    rate: usize,

    window: Duration,

    /// Instants of the most recent grants, oldest first.
    /// tokio's mutex queues waiters FIFO, so no caller is starved.
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing `per_second` calls per rolling second
    pub fn per_second(per_second: NonZeroU32) -> Self {
        Self::with_window(per_second, Duration::from_secs(1))
    }

    pub fn with_window(rate: NonZeroU32, window: Duration) -> Self {
        let rate = rate.get() as usize;
        Self {
            rate,
            window,
            grants: Mutex::new(VecDeque::with_capacity(rate)),
        }
    }

    pub fn rate(&self) -> usize {
        self.rate
    }

    /// Wait until one more call is permitted, then record it
    pub async fn acquire(&self) {
        // The lock is held while sleeping: only the head waiter can be next
        // to get a grant, and later callers queue up behind it in order.
        let mut grants = self.grants.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = grants.front() {
                if now.duration_since(oldest) >= self.window {
                    grants.pop_front();
                } else {
                    break;
                }
            }

            if grants.len() < self.rate {
                grants.push_back(now);
                return;
            }

            // Window full: the oldest grant leaving frees the next slot
            if let Some(&oldest) = grants.front() {
                let ready_at = oldest + self.window;
                debug!("Rate limit reached, waiting {:?}", ready_at.duration_since(now));
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }
}
