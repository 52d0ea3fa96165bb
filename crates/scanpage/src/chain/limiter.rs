//! Minimum-interval request limiter.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum gap between consecutive requests.
///
/// Clones share the same last-request slot, so one limiter can be handed to
/// several fetchers that talk to the same provider.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `min_interval` has passed since the previous acquire, then claim the slot.
    pub async fn acquire(&self) {
        let prev = *self.last.lock().unwrap_or_else(|e| e.into_inner());
        let wait = prev
            .map(|prev| self.min_interval.saturating_sub(prev.elapsed()))
            .unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}
