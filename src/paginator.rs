//! Lazy multi-page listings
//!
//! A [`Paginator`] pulls one page at a time from a [`PageSource`] and hands
//! out its items in order. The next page is only requested once every item of
//! the current one has been consumed, so a caller that stops early never pays
//! for pages it did not look at.
//!
//! ```ignore
//! let mut broadcasts = client.list_broadcasts("twitcasting_jp");
//! while let Some(broadcast) = broadcasts.next().await {
//!     println!("{}", broadcast?.title);
//! }
//! for failure in broadcasts.parse_failures() {
//!     eprintln!("skipped: {failure}");
//! }
//! ```

use std::collections::VecDeque;

use futures_util::{Stream, stream};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{Error, Listing, PageCursor, ParseError, parser::Page};

/// Produces the pages of one listing
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Fetch the page at `cursor`; `None` is the first page
    async fn fetch_page(&self, cursor: Option<&PageCursor>) -> Result<Page<Self::Item>, Error>;
}

/// Where the next fetch starts
#[derive(Debug, Clone)]
enum Position {
    /// A page remains; `None` is the first page
    Next(Option<PageCursor>),
    Exhausted,
}

/// Pull-based sequence of items spanning several pages
pub struct Paginator<S: PageSource> {
    source: S,
    start: Option<PageCursor>,
    position: Position,
    buffer: VecDeque<S::Item>,
    failures: Vec<ParseError>,
    pages_fetched: u32,
    max_pages: Option<u32>,
    cancel: Option<CancellationToken>,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            start: None,
            position: Position::Next(None),
            buffer: VecDeque::new(),
            failures: Vec::new(),
            pages_fetched: 0,
            max_pages: None,
            cancel: None,
        }
    }

    /// Resume from a cursor saved with [`Paginator::cursor`]
    pub fn starting_at(mut self, cursor: PageCursor) -> Self {
        self.start = Some(cursor.clone());
        self.position = Position::Next(Some(cursor));
        self
    }

    /// Stop after `pages` pages have been fetched
    pub fn max_pages(mut self, pages: u32) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Stop before the next page fetch once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Cursor of the next page to fetch, `None` once the listing is exhausted
    /// or when the next page is the first one
    pub fn cursor(&self) -> Option<&PageCursor> {
        match &self.position {
            Position::Next(cursor) => cursor.as_ref(),
            Position::Exhausted => None,
        }
    }

    /// Items dropped so far because they could not be parsed
    pub fn parse_failures(&self) -> &[ParseError] {
        &self.failures
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Start over from the first page (or the resume cursor)
    pub fn restart(&mut self) {
        self.position = Position::Next(self.start.clone());
        self.buffer.clear();
        self.failures.clear();
        self.pages_fetched = 0;
    }

    /// Next item, fetching the following page when the current one is used up
    ///
    /// A fetch error is returned once; the paginator is exhausted afterwards.
    pub async fn next(&mut self) -> Option<Result<S::Item, Error>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            let cursor = match &self.position {
                Position::Next(cursor) => cursor.clone(),
                Position::Exhausted => return None,
            };
            if self.max_pages.is_some_and(|max| self.pages_fetched >= max) {
                trace!(pages = self.pages_fetched, "page limit reached");
                self.position = Position::Exhausted;
                return None;
            }

            let fetched = match &self.cancel {
                Some(token) if token.is_cancelled() => None,
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    page = self.source.fetch_page(cursor.as_ref()) => Some(page),
                },
                None => Some(self.source.fetch_page(cursor.as_ref()).await),
            };

            let page = match fetched {
                None => {
                    trace!("listing cancelled");
                    self.position = Position::Exhausted;
                    return None;
                }
                Some(Err(error)) => {
                    self.position = Position::Exhausted;
                    return Some(Err(error));
                }
                Some(Ok(page)) => page,
            };

            self.pages_fetched += 1;
            trace!(
                page = self.pages_fetched,
                items = page.items.len(),
                failures = page.failures.len(),
                has_next = page.next.is_some(),
                "fetched page"
            );

            // An empty page ends the listing even if it advertises a successor
            let empty = page.is_empty();
            self.position = match page.next {
                Some(next) if !empty => Position::Next(Some(next)),
                _ => Position::Exhausted,
            };
            self.failures.extend(page.failures);
            self.buffer.extend(page.items);
        }
    }

    /// Drain the remaining pages into a [`Listing`]
    pub async fn collect(mut self) -> Result<Listing<S::Item>, Error> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(Listing::new(items, self.failures))
    }

    /// Adapt into a [`Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Result<S::Item, Error>>
    where
        S: 'static,
    {
        stream::unfold(self, |mut paginator| async move {
            let item = paginator.next().await?;
            Some((item, paginator))
        })
    }
}
