use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum spacing of `1/rate` seconds between granted calls.
///
/// Each call site that talks to a distinct host holds its own instance;
/// the internal state is behind an async mutex so an instance shared
/// within one worker still hands out slots one at a time.
pub struct RateLimiter {
    min_interval: Duration,
    last_granted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let rate = if requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        Self {
            min_interval: Duration::from_secs_f64(1.0 / rate),
            last_granted: Mutex::new(None),
        }
    }

    /// Block until the spacing since the previously granted call has
    /// elapsed. Never fails; at worst it sleeps.
    pub async fn wait(&self) {
        let mut last = self.last_granted.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last {
            let ready = prev + self.min_interval;
            if ready > now {
                tokio::time::sleep_until(ready).await;
                *last = Some(ready);
                return;
            }
        }
        *last = Some(now);
    }
}
