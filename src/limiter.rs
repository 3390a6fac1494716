//! Request pacing
//!
//! A limiter is consulted before every attempt, retries included.
//!
//! ```ignore
//! // Bursts of up to 2 requests, 2 per second on average
//! let client = Client::builder().rate_limit(2.0).build()?;
//!
//! // Half a second before every request
//! let client = Client::builder().delay(Duration::from_millis(500)).build()?;
//! ```

use std::time::Duration;

use tokio::{
    sync::Mutex,
    time::{Instant, sleep},
};
use tracing::trace;

/// Pacing strategy applied before each request attempt
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until the next attempt may be sent
    async fn acquire(&self);
}

struct Bucket {
    /// Negative while earlier callers are still waiting for their token
    tokens: f64,
    updated: Instant,
}

/// Token bucket that reserves a token up front and sleeps off the debt
///
/// The bucket holds at most `max(rate, 1)` tokens, so rates below one request
/// per second still let a single request through.
pub struct TokenBucketLimiter {
    bucket: Mutex<Bucket>,
    rate: f64,
    capacity: f64,
}

impl TokenBucketLimiter {
    /// Limiter averaging `requests_per_second`, starting with a full bucket
    pub fn new(requests_per_second: f64) -> Self {
        let capacity = requests_per_second.max(1.0);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                updated: Instant::now(),
            }),
            rate: requests_per_second,
            capacity,
        }
    }

    /// Take a token and return how long to wait before using it
    async fn reserve(&self) -> Duration {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.updated = now;

        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            // Waits past `Duration::MAX` saturate
            Duration::try_from_secs_f64(-bucket.tokens / self.rate).unwrap_or(Duration::MAX)
        }
    }
}

#[async_trait::async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn acquire(&self) {
        let wait = self.reserve().await;
        if !wait.is_zero() {
            trace!(?wait, "waiting for a rate limit token");
            sleep(wait).await;
        }
    }
}

/// Fixed delay before every request
pub struct DelayLimiter {
    delay: Duration,
}

impl DelayLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl RateLimiter for DelayLimiter {
    async fn acquire(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

/// Pacing configured on a client
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimiterConfig {
    /// Sleep this long before every attempt
    Delay(Duration),
    /// Token bucket refilled at this rate
    TokenBucket { requests_per_second: f64 },
    None,
}

impl RateLimiterConfig {
    /// Limiter for this strategy; `None` when requests are not paced
    pub fn build(&self) -> Option<Box<dyn RateLimiter>> {
        match self {
            Self::Delay(delay) => Some(Box::new(DelayLimiter::new(*delay))),
            Self::TokenBucket {
                requests_per_second,
            } => Some(Box::new(TokenBucketLimiter::new(*requests_per_second))),
            Self::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bucket_allows_burst_then_paces() {
        let limiter = TokenBucketLimiter::new(2.0);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1010), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_rate_still_admits_first_request() {
        let limiter = TokenBucketLimiter::new(0.5);
        let start = Instant::now();

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_refills_up_to_capacity() {
        let limiter = TokenBucketLimiter::new(1.0);
        limiter.acquire().await;

        sleep(Duration::from_secs(10)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanishing_rate_saturates_the_wait() {
        let limiter = TokenBucketLimiter::new(1e-20);
        assert_eq!(limiter.reserve().await, Duration::ZERO);
        assert_eq!(limiter.reserve().await, Duration::MAX);

        let pending = tokio::time::timeout(Duration::from_secs(60), limiter.acquire()).await;
        assert!(pending.is_err());
    }

    #[test]
    fn test_config_builds_matching_limiter() {
        assert!(RateLimiterConfig::None.build().is_none());
        assert!(RateLimiterConfig::Delay(Duration::from_millis(1)).build().is_some());
        assert!(
            RateLimiterConfig::TokenBucket {
                requests_per_second: 3.0
            }
            .build()
            .is_some()
        );
    }
}
