//! Async scraping client for TwitCasting
//!
//! [`Client`] fetches user profiles, broadcasts, comment feeds and Premier
//! shop items, retrying transient failures and bounding concurrency. Listings
//! are lazy [`Paginator`]s. Parsers are pure functions over payloads and are
//! exported for use on saved pages.

// Core modules
mod backend;
mod client;
mod error;
mod executor;
mod extract;
mod limiter;
mod model;
mod observer;
mod paginator;
pub mod parser;
pub mod transport;
pub mod urls;

// Public exports
pub use backend::ElementRef;
pub use client::{
    BroadcastPages, Client, ClientBuilder, ClientConfig, CommentPages, DEFAULT_COMMENT_PAGE_SIZE,
    PremierPages,
};
pub use error::{ConfigError, Error, FetchError, ParseError, TransportError, ValueError};
pub use executor::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_CONCURRENCY, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_RETRIES, Executor, RetryPolicy,
};
pub use extract::{Count, FromHtml, parse_numeric_id, parse_timestamp, timestamp_from_epoch};
pub use limiter::{DelayLimiter, RateLimiter, RateLimiterConfig, TokenBucketLimiter};
pub use model::{
    Broadcast, BroadcastId, BroadcastStatus, Comment, CommentAuthor, CommentId, Listing,
    PageCursor, PremierGenre, PremierItem, PremierSearch, PremierTicket, User, UserId,
};
pub use observer::{FetchObserver, FetchStats, ObserverRegistry, StatsTracker};
pub use paginator::{PageSource, Paginator};
pub use parser::{Page, PageKind, ParseContext, Payload};
pub use urls::UrlNormalizer;
