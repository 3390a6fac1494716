//! Request executor: retry, backoff, concurrency limiting and validation
//!
//! The executor turns a fetch intent (a URL and the [`PageKind`] expected
//! there) into a validated [`Payload`]. Every attempt holds one semaphore
//! permit for exactly the duration of the HTTP exchange; the permit is
//! released before any backoff sleep and before returning, so dropping a
//! fetch future at any point never leaks capacity.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use tokio::{sync::Semaphore, time::sleep};
use tracing::{debug, warn};

use crate::{
    ConfigError, FetchError, ParseError, TransportError,
    limiter::RateLimiter,
    observer::{ObserverRegistry, StatsTracker},
    parser::{PageKind, Payload},
    transport::{HttpRequest, HttpResponse, Transport},
};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Upper bound of the random extra wait, as a fraction of the computed delay
const JITTER_FRACTION: f64 = 0.25;

/// Statuses worth another attempt; 429 is handled as throttling
const RETRIABLE_STATUSES: &[u16] = &[502, 503, 504];

/// Exponential backoff with optional jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ConfigError::InvalidBackoffFactor(self.factor));
        }
        Ok(())
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based), without jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let seconds = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        if !seconds.is_finite() || seconds >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Full wait after failed attempt `attempt`, honoring a server hint
    fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.delay_for(attempt);
        if self.jitter && !delay.is_zero() {
            let extra = rand::rng().random_range(0.0..=JITTER_FRACTION);
            delay += delay.mul_f64(extra);
        }
        if let Some(hint) = retry_after {
            delay = delay.max(hint);
        }
        delay.min(self.max_delay)
    }
}

/// Shared request executor
///
/// One executor is shared by every operation of a client. It owns the
/// concurrency semaphore, the optional rate limiter, observers and counters.
pub struct Executor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    semaphore: Semaphore,
    rate_limiter: Option<Box<dyn RateLimiter>>,
    observers: ObserverRegistry,
    stats: Arc<StatsTracker>,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            transport,
            policy,
            semaphore: Semaphore::new(concurrency),
            rate_limiter: None,
            observers: ObserverRegistry::new(),
            stats: Arc::new(StatsTracker::new()),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Option<Box<dyn RateLimiter>>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn with_observers(mut self, observers: ObserverRegistry) -> Self {
        self.observers = observers;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    /// Permits currently free; equals the configured concurrency when idle
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Fetch `url` and validate the response as `kind`
    ///
    /// Transport failures, 429/502/503/504 and the throttle page are retried
    /// up to `max_retries` times. Everything else fails on the first attempt.
    pub async fn fetch(&self, kind: PageKind, url: &str) -> Result<Payload, FetchError> {
        let request = HttpRequest::get(url, kind.content());
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.attempt(kind, &request, attempt).await {
                Ok(payload) => return Ok(payload),
                Err(error) => error,
            };

            if !is_retriable(&error) || attempt > self.policy.max_retries {
                warn!(url, attempt, error = %error, "fetch failed");
                self.stats.fetch_failed();
                self.observers.notify_failure(url, &error.to_string()).await;
                return Err(error);
            }

            let delay = self.policy.backoff(attempt, retry_after(&error));
            let reason = error.to_string();
            warn!(url, attempt, delay_ms = delay.as_millis() as u64, reason = %reason, "retrying");
            self.stats.retry_scheduled();
            self.observers
                .notify_retry(url, attempt, delay, &reason)
                .await;
            sleep(delay).await;
        }
    }

    /// One attempt; holds a permit only while the request is in flight
    async fn attempt(
        &self,
        kind: PageKind,
        request: &HttpRequest,
        attempt: u32,
    ) -> Result<Payload, FetchError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| TransportError::Other {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        self.stats.request_sent();
        self.observers.notify_request(&request.url, attempt).await;
        debug!(url = %request.url, ?kind, attempt, "sending attempt");

        let response = self.transport.execute(request).await;
        drop(permit);
        let response = response?;

        debug!(url = %response.url, status = response.status, "received response");
        let status = response.status;
        let payload = kind.inspect(check_status(response)?)?;
        self.observers.notify_response(&payload.url, status).await;
        Ok(payload)
    }

    /// Count and announce list items a parser had to drop
    pub(crate) async fn report_parse_failures(&self, url: &str, failures: &[ParseError]) {
        if failures.is_empty() {
            return;
        }
        self.stats.parse_failed(failures.len());
        for failure in failures {
            warn!(url, error = %failure, "dropped unparseable item");
            self.observers.notify_parse_failure(url, failure).await;
        }
    }
}

fn check_status(response: HttpResponse) -> Result<HttpResponse, FetchError> {
    if response.is_success() {
        return Ok(response);
    }
    if response.status == 429 {
        return Err(FetchError::Throttled {
            retry_after: parse_retry_after(&response),
            url: response.url,
        });
    }
    Err(FetchError::Status {
        url: response.url,
        status: response.status,
    })
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
fn parse_retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn is_retriable(error: &FetchError) -> bool {
    match error {
        FetchError::Transport(_) | FetchError::Throttled { .. } => true,
        FetchError::Status { status, .. } => RETRIABLE_STATUSES.contains(status),
        FetchError::Missing { .. } | FetchError::UnexpectedResponse { .. } => false,
    }
}

fn retry_after(error: &FetchError) -> Option<Duration> {
    match error {
        FetchError::Throttled { retry_after, .. } => *retry_after,
        _ => None,
    }
}
