use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum spacing between requests, shared by every worker.
///
/// The last request time is read and updated under one lock that is held
/// through the sleep, so concurrent callers queue up behind each other.
#[derive(Debug)]
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_delay: Duration,
    max_delay: Duration,
}

impl RateLimiter {
    /// Each request waits a random interval in `[min_delay, max_delay]`
    /// after the previous one.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    pub fn from_secs(min: f64, max: f64) -> Self {
        Self::new(
            Duration::from_secs_f64(min.max(0.0)),
            Duration::from_secs_f64(max.max(0.0)),
        )
    }

    /// Fixed interval, no jitter
    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval)
    }

    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let target = self.jittered_delay();
            let elapsed = previous.elapsed();
            if elapsed < target {
                tokio::time::sleep(target - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }

    fn jittered_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let secs = rand::rng()
            .random_range(self.min_delay.as_secs_f64()..=self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::fixed(Duration::from_secs(5));
        let start = std::time::Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(40),
            Duration::from_millis(60),
        ));
        let start = std::time::Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.wait().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // three gaps of at least 40ms each
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let limiter = RateLimiter::from_secs(2.0, 4.0);
        for _ in 0..100 {
            let d = limiter.jittered_delay();
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(4));
        }
    }
}
