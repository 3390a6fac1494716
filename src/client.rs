//! Client facade
//!
//! ```ignore
//! use senskrap::{Client, PremierGenre, PremierSearch};
//!
//! let client = Client::builder()
//!     .proxy("socks5://127.0.0.1:9050")
//!     .max_retries(5)
//!     .concurrency(4)
//!     .build()?;
//!
//! let user = client.get_user("@twitcasting_jp").await?;
//! let broadcasts = client.list_broadcasts(&user.screen_id).collect().await?;
//! let shop = client
//!     .scrape_premier(PremierSearch::Genre(PremierGenre::Music), Some(2))
//!     .await?;
//! ```

use std::{collections::HashSet, sync::Arc, time::Duration};

use futures_util::future::join_all;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    Broadcast, BroadcastId, Comment, ConfigError, Error, FetchObserver, FetchStats, Listing,
    PageCursor, ParseError, PremierItem, PremierSearch, User,
    executor::{DEFAULT_CONCURRENCY, Executor, RetryPolicy},
    limiter::RateLimiterConfig,
    observer::ObserverRegistry,
    paginator::{PageSource, Paginator},
    parser::{
        Page, PageKind, ParseContext, Payload, parse_broadcast_detail, parse_broadcast_list,
        parse_comment_stream, parse_premier_item, parse_premier_list, parse_user_profile,
    },
    transport::{HttpTransport, SessionConfig, Transport},
    urls::{self, UrlNormalizer},
};

/// Comments requested per page of the comment feed
pub const DEFAULT_COMMENT_PAGE_SIZE: u64 = 50;

/// Validated configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) session: SessionConfig,
    pub(crate) retry: RetryPolicy,
    pub(crate) concurrency: usize,
    pub(crate) rate_limiter: RateLimiterConfig,
    pub(crate) base_url: String,
    pub(crate) api_base_url: String,
    pub(crate) comment_page_size: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            rate_limiter: RateLimiterConfig::None,
            base_url: urls::DEFAULT_BASE_URL.to_string(),
            api_base_url: urls::DEFAULT_API_BASE_URL.to_string(),
            comment_page_size: DEFAULT_COMMENT_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.retry.validate()?;
        if self.concurrency == 0 || self.concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }
        if let RateLimiterConfig::TokenBucket {
            requests_per_second,
        } = self.rate_limiter
            && !(requests_per_second.is_finite() && requests_per_second > 0.0)
        {
            return Err(ConfigError::InvalidRateLimit(requests_per_second));
        }
        parse_base_url(&self.base_url)?;
        parse_base_url(&self.api_base_url)?;
        Ok(())
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("cannot be a base".to_string()));
    }
    Ok(url)
}

struct Inner {
    executor: Executor,
    base_url: Url,
    api_base_url: Url,
    comment_page_size: u64,
}

/// Async client for one platform
///
/// Cheap to clone; clones share the connection pool, the concurrency limit,
/// observers and statistics. Pooled connections are released when the last
/// clone is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Client with default settings
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Create a client builder for custom configuration
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Get a snapshot of current fetch statistics
    pub fn stats(&self) -> FetchStats {
        self.inner.executor.stats().snapshot()
    }

    /// Subscribe to real-time statistics updates
    pub fn subscribe_stats(&self) -> watch::Receiver<FetchStats> {
        self.inner.executor.stats().subscribe()
    }

    /// Request slots currently free
    pub fn available_permits(&self) -> usize {
        self.inner.executor.available_permits()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Fetch a user's profile
    ///
    /// `user` is a screen id with or without the leading `@`, or a profile URL.
    pub async fn get_user(&self, user: &str) -> Result<User, Error> {
        let screen_id = self.screen_id(user)?;
        let url = urls::profile_url(self.base_url(), &screen_id);
        debug!(%url, "fetching user");
        let context = self.context();
        self.fetch(PageKind::UserProfilePage, &url, |payload| {
            parse_user_profile(payload.html_body()?, &context)
        })
        .await
    }

    /// Fetch one broadcast of `user`
    pub async fn get_broadcast(&self, user: &str, id: BroadcastId) -> Result<Broadcast, Error> {
        let screen_id = self.screen_id(user)?;
        let url = urls::broadcast_url(self.base_url(), &screen_id, id);
        self.get_broadcast_by_url(&url).await
    }

    /// Fetch a broadcast from its page URL, absolute or site-relative
    pub async fn get_broadcast_by_url(&self, url: &str) -> Result<Broadcast, Error> {
        let url = self.resolve(url)?;
        debug!(%url, "fetching broadcast");
        let context = self.context();
        self.fetch(PageKind::BroadcastDetailPage, &url, |payload| {
            parse_broadcast_detail(payload.html_body()?, &context)
        })
        .await
    }

    /// Broadcasts of `user`, newest first, one page at a time
    pub fn list_broadcasts(&self, user: &str) -> Paginator<BroadcastPages> {
        Paginator::new(BroadcastPages {
            client: self.clone(),
            user: user.to_string(),
        })
    }

    /// Comments of a broadcast in feed order
    pub fn list_comments(&self, broadcast: BroadcastId) -> Paginator<CommentPages> {
        Paginator::new(CommentPages {
            client: self.clone(),
            broadcast,
            limit: self.inner.comment_page_size,
        })
    }

    /// Result pages of a Premier shop search
    pub fn premier_pages(&self, search: PremierSearch) -> Paginator<PremierPages> {
        Paginator::new(PremierPages {
            client: self.clone(),
            search,
        })
    }

    /// URLs of the Premier items matching `search`
    ///
    /// At most `max_pages` result pages are read. URLs repeated across pages
    /// are returned once.
    pub async fn search_premier(
        &self,
        search: PremierSearch,
        max_pages: Option<u32>,
    ) -> Result<Listing<String>, Error> {
        let mut pages = self.premier_pages(search);
        if let Some(max_pages) = max_pages {
            pages = pages.max_pages(max_pages);
        }
        let listing = pages.collect().await?;

        let mut seen = HashSet::new();
        let items = listing
            .items
            .into_iter()
            .filter(|url| seen.insert(UrlNormalizer::normalize(url)))
            .collect();
        Ok(Listing::new(items, listing.failures))
    }

    /// Fetch a Premier item page, absolute or site-relative
    pub async fn get_premier_item(&self, url: &str) -> Result<PremierItem, Error> {
        let url = self.resolve(url)?;
        debug!(%url, "fetching premier item");
        let context = self.context();
        self.fetch(PageKind::PremierItemPage, &url, |payload| {
            parse_premier_item(payload.html_body()?, &payload.url, &context)
        })
        .await
    }

    /// Search, then fetch every matching item
    ///
    /// Item pages are fetched concurrently within the client's concurrency
    /// limit. An item that fails is recorded in [`Listing::failures`]; only a
    /// failing search aborts.
    pub async fn scrape_premier(
        &self,
        search: PremierSearch,
        max_pages: Option<u32>,
    ) -> Result<Listing<PremierItem, Error>, Error> {
        let links = self.search_premier(search, max_pages).await?;
        info!(items = links.items.len(), "fetching premier items");

        let results = join_all(links.items.iter().map(|url| self.get_premier_item(url))).await;
        let mut listing = Listing::default();
        for result in results {
            match result {
                Ok(item) => listing.items.push(item),
                Err(error) => listing.failures.push(error),
            }
        }
        Ok(listing)
    }

    fn context(&self) -> ParseContext {
        ParseContext::new(self.inner.base_url.clone())
    }

    fn screen_id(&self, user: &str) -> Result<String, Error> {
        urls::screen_id_from(user).ok_or_else(|| Error::NotFound {
            url: user.to_string(),
        })
    }

    fn resolve(&self, url: &str) -> Result<String, Error> {
        urls::resolve(self.base_url(), url).ok_or_else(|| Error::NotFound {
            url: url.to_string(),
        })
    }

    async fn fetch<T>(
        &self,
        kind: PageKind,
        url: &str,
        parse: impl FnOnce(&Payload) -> Result<T, ParseError>,
    ) -> Result<T, Error> {
        let payload = self.inner.executor.fetch(kind, url).await?;
        parse(&payload).map_err(|error| {
            warn!(url = %payload.url, %error, "page no longer matches its parser");
            Error::upstream_changed(&payload.url, &error)
        })
    }

    async fn fetch_page<T>(
        &self,
        kind: PageKind,
        url: &str,
        parse: impl FnOnce(&Payload) -> Result<Page<T>, ParseError>,
    ) -> Result<Page<T>, Error> {
        let page = self.fetch(kind, url, parse).await?;
        self.inner
            .executor
            .report_parse_failures(url, &page.failures)
            .await;
        Ok(page)
    }
}

/// Page index of a `Page` cursor; other cursor kinds start from the first page
fn page_index(cursor: Option<&PageCursor>) -> u32 {
    match cursor {
        Some(PageCursor::Page(index)) => *index,
        _ => 0,
    }
}

/// Pages of a user's broadcast listing
pub struct BroadcastPages {
    client: Client,
    user: String,
}

#[async_trait::async_trait]
impl PageSource for BroadcastPages {
    type Item = Broadcast;

    async fn fetch_page(&self, cursor: Option<&PageCursor>) -> Result<Page<Broadcast>, Error> {
        let screen_id = self.client.screen_id(&self.user)?;
        let index = page_index(cursor);
        let url = urls::broadcast_list_url(self.client.base_url(), &screen_id, index);
        let context = self
            .client
            .context()
            .with_cursor(Some(PageCursor::Page(index)));
        self.client
            .fetch_page(PageKind::BroadcastListPage, &url, |payload| {
                parse_broadcast_list(payload.html_body()?, &context)
            })
            .await
    }
}

/// Pages of a broadcast's comment feed
pub struct CommentPages {
    client: Client,
    broadcast: BroadcastId,
    limit: u64,
}

#[async_trait::async_trait]
impl PageSource for CommentPages {
    type Item = Comment;

    async fn fetch_page(&self, cursor: Option<&PageCursor>) -> Result<Page<Comment>, Error> {
        let (offset, limit) = match cursor {
            Some(PageCursor::Offset { offset, limit }) => (*offset, *limit),
            _ => (0, self.limit),
        };
        let url = urls::comments_url(
            &self.client.inner.api_base_url,
            self.broadcast,
            offset,
            limit,
        );
        let context = self
            .client
            .context()
            .with_cursor(Some(PageCursor::Offset { offset, limit }))
            .with_broadcast(self.broadcast);
        self.client
            .fetch_page(PageKind::CommentStreamResponse, &url, |payload| {
                parse_comment_stream(payload.json_body()?, &context)
            })
            .await
    }
}

/// Result pages of a Premier shop search
pub struct PremierPages {
    client: Client,
    search: PremierSearch,
}

#[async_trait::async_trait]
impl PageSource for PremierPages {
    type Item = String;

    async fn fetch_page(&self, cursor: Option<&PageCursor>) -> Result<Page<String>, Error> {
        let index = page_index(cursor);
        let url = urls::premier_search_url(self.client.base_url(), &self.search, index);
        let context = self
            .client
            .context()
            .with_cursor(Some(PageCursor::Page(index)));
        self.client
            .fetch_page(PageKind::PremierListPage, &url, |payload| {
                parse_premier_list(payload.html_body()?, &context)
            })
            .await
    }
}

/// Builder for configuring a [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    observers: Vec<Arc<dyn FetchObserver>>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Create a new ClientBuilder with default settings
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            observers: Vec::new(),
            transport: None,
        }
    }

    /// Route every request through an HTTP, HTTPS or SOCKS5 proxy
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.config.session.proxies = vec![url.into()];
        self
    }

    /// Pick the session's proxy at random from these candidates
    ///
    /// Every candidate is validated, not only the one picked.
    pub fn proxies<I, S>(mut self, proxies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.session.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    /// Per-request timeout (default: 30s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.session.timeout = timeout;
        self
    }

    /// Use exactly this User-Agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.session.user_agents = vec![user_agent.into()];
        self
    }

    /// Pick the User-Agent at random from these candidates
    pub fn user_agents<I, S>(mut self, user_agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.session.user_agents = user_agents.into_iter().map(Into::into).collect();
        self
    }

    /// Idle connections kept per host (default: 10)
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.config.session.max_connections = max_connections;
        self
    }

    /// Send an extra header with every request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.session.headers.push((name.into(), value.into()));
        self
    }

    /// Retries after the first attempt (default: 3)
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    /// Exponential backoff parameters (default: 0.5s, x2, capped at 8s)
    pub fn backoff(mut self, base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        self.config.retry.base_delay = base_delay;
        self.config.retry.factor = factor;
        self.config.retry.max_delay = max_delay;
        self
    }

    /// Add up to 25% random extra wait to every backoff (default: on)
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.config.retry.jitter = jitter;
        self
    }

    /// Maximum requests in flight at once (default: 5)
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the delay before every request
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.rate_limiter = RateLimiterConfig::Delay(delay);
        self
    }

    /// Set rate limiting using token bucket algorithm
    ///
    /// # Arguments
    /// * `requests_per_second` - Maximum number of requests allowed per second
    pub fn rate_limit(mut self, requests_per_second: f64) -> Self {
        self.config.rate_limiter = RateLimiterConfig::TokenBucket {
            requests_per_second,
        };
        self
    }

    /// Comments requested per page (default: 50)
    pub fn comment_page_size(mut self, size: u64) -> Self {
        self.config.comment_page_size = size.max(1);
        self
    }

    /// Site root for pages and link resolution
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Root of the JSON endpoints
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    /// Send requests through `transport` instead of the built-in HTTP session
    ///
    /// Session settings (proxy, timeout, headers) are still validated but not
    /// applied.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register an observer to receive fetch events
    pub fn observe_with(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build the Client with the configured settings
    pub fn build(self) -> Result<Client, ConfigError> {
        self.config.validate()?;
        let base_url = parse_base_url(&self.config.base_url)?;
        let api_base_url = parse_base_url(&self.config.api_base_url)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.session)?),
        };

        let mut observers = ObserverRegistry::new();
        for observer in self.observers {
            observers.register(observer);
        }

        let executor = Executor::new(transport, self.config.retry, self.config.concurrency)
            .with_rate_limiter(self.config.rate_limiter.build())
            .with_observers(observers);

        Ok(Client {
            inner: Arc::new(Inner {
                executor,
                base_url,
                api_base_url,
                comment_page_size: self.config.comment_page_size,
            }),
        })
    }
}
