use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Pacing state owned by one client.
#[derive(Debug)]
pub struct RateState {
    /// Instant of the most recent grant.
    pub last_request: Option<Instant>,
}

/// Spaces dispatches at least `min_interval` apart.
///
/// Callers queue on a fair async mutex and wait their turn while holding
/// it, so consecutive grants are monotonically spaced even when many tasks
/// call [`RateLimiter::acquire`] at once. Only the calling task is
/// suspended.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    state: Mutex<RateState>,
}

impl RateLimiter {
    /// Limiter whose first grant is immediate.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(RateState { last_request: None }),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the caller may dispatch, records the grant and returns
    /// its instant.
    pub async fn acquire(&self) -> Instant {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "pacing request");
                sleep(wait).await;
            }
        }
        let now = Instant::now();
        state.last_request = Some(now);
        now
    }
}
