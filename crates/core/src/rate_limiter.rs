use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum delay between successive requests to the same host.
///
/// Shared between concurrent workers: each caller reserves the next free
/// slot for its host under the lock and then sleeps outside of it, so
/// requests to one host are spaced out while other hosts proceed.
#[derive(Debug)]
pub struct RateLimiter {
    /// Next instant a request to each host may start
    next_slot: Mutex<HashMap<String, Instant>>,
    min_delay: Duration,
    /// Jitter factor to add randomness (0.0 to 1.0)
    jitter_factor: f64,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self::with_jitter(min_delay, 0.0)
    }

    pub fn with_jitter(min_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            next_slot: Mutex::new(HashMap::new()),
            min_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    fn spacing(&self) -> Duration {
        if self.jitter_factor == 0.0 || self.min_delay.is_zero() {
            return self.min_delay;
        }
        let mut rng = rand::thread_rng();
        let jitter_ms = (self.min_delay.as_millis() as f64 * self.jitter_factor) as u64;
        self.min_delay + Duration::from_millis(rng.gen_range(0..=jitter_ms))
    }

    /// Wait until a request to `host` may start.
    pub async fn wait_for_host(&self, host: &str) {
        let start = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let start = slots.get(host).copied().filter(|t| *t > now).unwrap_or(now);
            slots.insert(host.to_string(), start + self.spacing());
            start
        };
        if start > Instant::now() {
            tracing::debug!(host = %host, "rate limited");
            tokio::time::sleep_until(start).await;
        }
    }
}

/// Host part of `url`, or the whole string when it does not parse.
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            })
        })
        .unwrap_or_else(|| url.to_string())
}
