//! Fetch observers and statistics
//!
//! Implement [`FetchObserver`] to monitor requests, collect custom metrics, or
//! feed an external logging pipeline. Counters are kept by [`StatsTracker`]
//! regardless of observers.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::ParseError;

/// Observer trait for receiving fetch events
///
/// # Example
///
/// ```ignore
/// use senskrap::FetchObserver;
///
/// struct LoggingObserver;
///
/// #[async_trait::async_trait]
/// impl FetchObserver for LoggingObserver {
///     async fn on_retry(&self, url: &str, attempt: u32, delay: Duration, reason: &str) {
///         println!("retrying {url} (attempt {attempt}) in {delay:?}: {reason}");
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait FetchObserver: Send + Sync {
    /// Called right before a request attempt is sent
    async fn on_request(&self, _url: &str, _attempt: u32) {}

    /// Called when an attempt failed and another one is scheduled
    async fn on_retry(&self, _url: &str, _attempt: u32, _delay: Duration, _reason: &str) {}

    /// Called when a response passed validation
    async fn on_response(&self, _url: &str, _status: u16) {}

    /// Called when a fetch gives up
    async fn on_failure(&self, _url: &str, _error: &str) {}

    /// Called for every list item dropped because it could not be parsed
    async fn on_parse_failure(&self, _url: &str, _error: &ParseError) {}
}

/// Registry for managing multiple fetch observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn FetchObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn register(&mut self, observer: Arc<dyn FetchObserver>) {
        self.observers.push(observer);
    }

    pub async fn notify_request(&self, url: &str, attempt: u32) {
        for observer in &self.observers {
            observer.on_request(url, attempt).await;
        }
    }

    pub async fn notify_retry(&self, url: &str, attempt: u32, delay: Duration, reason: &str) {
        for observer in &self.observers {
            observer.on_retry(url, attempt, delay, reason).await;
        }
    }

    pub async fn notify_response(&self, url: &str, status: u16) {
        for observer in &self.observers {
            observer.on_response(url, status).await;
        }
    }

    pub async fn notify_failure(&self, url: &str, error: &str) {
        for observer in &self.observers {
            observer.on_failure(url, error).await;
        }
    }

    pub async fn notify_parse_failure(&self, url: &str, error: &ParseError) {
        for observer in &self.observers {
            observer.on_parse_failure(url, error).await;
        }
    }
}

/// Snapshot of fetch statistics
#[derive(Debug, Clone)]
pub struct FetchStats {
    /// Request attempts sent, retries included
    pub requests_sent: usize,
    /// Attempts that were followed by another attempt
    pub retries: usize,
    /// Logical fetches that gave up
    pub failures: usize,
    /// List items dropped because they could not be parsed
    pub parse_failures: usize,
    pub start_time: Instant,
    pub last_update: Instant,
}

impl FetchStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            requests_sent: 0,
            retries: 0,
            failures: 0,
            parse_failures: 0,
            start_time: now,
            last_update: now,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.last_update.duration_since(self.start_time)
    }
}

impl Default for FetchStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe statistics tracker with real-time broadcasting
pub struct StatsTracker {
    requests_sent: AtomicUsize,
    retries: AtomicUsize,
    failures: AtomicUsize,
    parse_failures: AtomicUsize,
    start_time: Instant,
    tx: watch::Sender<FetchStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(FetchStats::new());
        Self {
            requests_sent: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            parse_failures: AtomicUsize::new(0),
            start_time: Instant::now(),
            tx,
        }
    }

    /// Subscribe to statistics updates
    pub fn subscribe(&self) -> watch::Receiver<FetchStats> {
        self.tx.subscribe()
    }

    pub fn request_sent(&self) {
        // Relaxed: counters are informational and never gate control flow
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.broadcast();
    }

    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        self.broadcast();
    }

    pub fn fetch_failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.broadcast();
    }

    pub fn parse_failed(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.parse_failures.fetch_add(count, Ordering::Relaxed);
        self.broadcast();
    }

    fn broadcast(&self) {
        // send_replace never fails, even without receivers
        self.tx.send_replace(self.snapshot());
    }

    pub fn snapshot(&self) -> FetchStats {
        FetchStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            start_time: self.start_time,
            last_update: Instant::now(),
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
