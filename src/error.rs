//! Error types for fetching and extraction
//!
//! Errors are layered. Field-level conversion failures are [`ValueError`],
//! record-level extraction failures are [`ParseError`], request-level failures
//! are [`TransportError`] and [`FetchError`]. Callers of [`crate::Client`] only
//! ever see the small public [`Error`] taxonomy; configuration problems are
//! reported up front as [`ConfigError`].

use std::time::Duration;

use crate::parser::PageKind;

/// Public error surface of the client
///
/// Internal retry and parsing mechanics collapse into these four kinds so that
/// callers can decide what to do without depending on how a failure happened.
///
/// # Examples
///
/// ```ignore
/// use senskrap::{Client, Error};
///
/// match client.get_user("twitcasting_jp").await {
///     Ok(user) => println!("{} has {} followers", user.name, user.followers),
///     Err(Error::NotFound { url }) => eprintln!("no such user at {url}"),
///     Err(Error::RateLimited { .. }) => eprintln!("slow down"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The resource does not exist (404, 410 or an explicit "not found" page)
    #[error("resource not found: {url}")]
    NotFound { url: String },

    /// The upstream could not be reached or kept failing after retries
    #[error("upstream unavailable for {url}: {reason}")]
    Unavailable { url: String, reason: String },

    /// The response no longer matches the shape the parsers expect
    #[error("upstream response changed for {url}: {reason}")]
    UpstreamChanged { url: String, reason: String },

    /// The upstream is throttling this client
    #[error("rate limited by upstream at {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },
}

impl Error {
    /// URL of the request that produced this error
    pub fn url(&self) -> &str {
        match self {
            Self::NotFound { url }
            | Self::Unavailable { url, .. }
            | Self::UpstreamChanged { url, .. }
            | Self::RateLimited { url, .. } => url,
        }
    }

    pub(crate) fn upstream_changed(url: impl Into<String>, error: &ParseError) -> Self {
        Self::UpstreamChanged {
            url: url.into(),
            reason: error.to_string(),
        }
    }
}

/// Errors detected while validating client configuration
///
/// These are returned synchronously from [`crate::ClientBuilder::build`] and
/// never deferred to request time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The proxy URL could not be parsed or uses an unsupported scheme
    #[error("Invalid proxy URL '{url}': {reason}")]
    InvalidProxy { url: String, reason: String },

    /// Request timeout must be greater than zero
    #[error("Timeout must be greater than 0")]
    InvalidTimeout,

    /// Concurrency must be at least 1 and within the semaphore's permit limit
    #[error("Concurrency must be between 1 and the semaphore permit limit, got {0}")]
    InvalidConcurrency(usize),

    /// Connection pool size must be greater than 0
    #[error("Max connections must be greater than 0, got {0}")]
    InvalidMaxConnections(usize),

    /// Backoff factor must be at least 1
    #[error("Backoff factor must be at least 1.0, got {0}")]
    InvalidBackoffFactor(f64),

    /// Rate limit must be a positive number of requests per second
    #[error("Rate limit must be greater than 0, got {0}")]
    InvalidRateLimit(f64),

    /// A base URL could not be parsed
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A default header name or value is not valid HTTP
    #[error("Invalid header '{name}'")]
    InvalidHeader { name: String },

    /// The underlying HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}

/// Failure at the network layer
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("failed to read body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("request to {url} failed: {message}")]
    Other { url: String, message: String },
}

impl TransportError {
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Body { url, .. }
            | Self::Other { url, .. } => url,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let message = error.to_string();
        if error.is_timeout() {
            Self::Timeout { url }
        } else if error.is_connect() {
            Self::Connect { url, message }
        } else if error.is_body() || error.is_decode() {
            Self::Body { url, message }
        } else {
            Self::Other { url, message }
        }
    }
}

/// Failure of one logical fetch, after the retry policy has run its course
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-success HTTP status that is not retried (or ran out of retries)
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// HTTP 429 or a throttle marker in the body
    #[error("throttled at {url}")]
    Throttled {
        url: String,
        retry_after: Option<Duration>,
    },

    /// A well-formed response saying the resource does not exist
    #[error("{kind:?} reports missing resource at {url}")]
    Missing { url: String, kind: PageKind },

    /// The structural signature of the page kind was not found
    #[error("unexpected {kind:?} response from {url}: {reason}")]
    UnexpectedResponse {
        url: String,
        kind: PageKind,
        reason: String,
    },
}

impl From<FetchError> for Error {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Transport(e) => Error::Unavailable {
                url: e.url().to_string(),
                reason: e.to_string(),
            },
            FetchError::Status { url, status } => match status {
                404 | 410 => Error::NotFound { url },
                429 => Error::RateLimited {
                    url,
                    retry_after: None,
                },
                _ => Error::Unavailable {
                    url,
                    reason: format!("HTTP {status}"),
                },
            },
            FetchError::Throttled { url, retry_after } => Error::RateLimited { url, retry_after },
            FetchError::Missing { url, .. } => Error::NotFound { url },
            FetchError::UnexpectedResponse { url, reason, .. } => {
                Error::UpstreamChanged { url, reason }
            }
        }
    }
}

/// A record could not be extracted from a payload
///
/// In list parsers this error is attached to the single item it concerns; the
/// rest of the page is still returned.
///
/// # Examples
///
/// ```ignore
/// use senskrap::ParseError;
///
/// for failure in listing.failures {
///     if let ParseError::MissingField { field, selector } = &failure {
///         eprintln!("'{field}' not found using '{selector}'");
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// Required field was not found in the payload
    ///
    /// For HTML payloads `selector` is a CSS selector, for JSON payloads it is
    /// the key path that was looked up.
    #[error("Required field '{field}' not found using selector '{selector}'")]
    MissingField { field: String, selector: String },

    /// Failed to convert the extracted text into the field's type
    #[error("Failed to parse field '{field}' from text '{text}': {error}")]
    InvalidField {
        field: String,
        text: String,
        error: ValueError,
    },
}

impl ParseError {
    pub(crate) fn missing(field: &str, selector: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
            selector: selector.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, text: &str, error: ValueError) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            text: text.to_string(),
            error,
        }
    }
}

/// Errors that can occur when converting extracted text into Rust values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    /// Not a plain or abbreviated count ("340", "1.2K", "3万")
    #[error("Invalid count: {text}")]
    InvalidCount { text: String },

    /// Not a recognised timestamp format
    #[error("Invalid timestamp: {text}")]
    InvalidTimestamp { text: String },

    /// Not a numeric identifier
    #[error("Invalid identifier: {text}")]
    InvalidIdentifier { text: String },

    /// Not one of the known status values
    #[error("Invalid status: {text}")]
    InvalidStatus { text: String },
}
