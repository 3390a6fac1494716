//! Page parsers keyed by page kind
//!
//! Every page or endpoint shape the client understands is one variant of
//! [`PageKind`]. A kind knows three things about its payloads: the content type
//! it expects, the structural signature proving a response still has the
//! expected shape, and the pure function that maps a validated payload to
//! records. Parsers never touch the network; the same payload always yields the
//! same records.

mod broadcast;
mod comment;
mod premier;
mod user;

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

pub use broadcast::{parse_broadcast_detail, parse_broadcast_list};
pub use comment::parse_comment_stream;
pub use premier::{parse_premier_item, parse_premier_list};
pub use user::parse_user_profile;

use crate::{
    Broadcast, BroadcastId, Comment, FetchError, PageCursor, ParseError, PremierItem, User,
    transport::{ContentKind, HttpResponse},
};

/// Marker of the platform's error page; `data-status` carries the HTTP-ish code
const ERROR_PAGE_SELECTOR: &str = "div.tw-error-page";
const NOT_FOUND_CODES: &[&str] = &["404", "410"];
const THROTTLED_CODES: &[&str] = &["429"];

/// The page and endpoint shapes the client knows how to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// `/{screen_id}`
    UserProfilePage,
    /// `/{screen_id}/show/{page}`
    BroadcastListPage,
    /// `/{screen_id}/movie/{movie_id}`
    BroadcastDetailPage,
    /// JSON comment feed of one movie
    CommentStreamResponse,
    /// `shop.php?search=..` result list
    PremierListPage,
    /// A single shop item
    PremierItemPage,
}

impl PageKind {
    pub fn content(self) -> ContentKind {
        match self {
            Self::CommentStreamResponse => ContentKind::Json,
            _ => ContentKind::Html,
        }
    }

    /// CSS selector (HTML kinds) or top-level key (JSON kinds) every valid
    /// payload of this kind carries
    pub fn signature(self) -> &'static str {
        match self {
            Self::UserProfilePage => user::SIGNATURE,
            Self::BroadcastListPage => broadcast::LIST_SIGNATURE,
            Self::BroadcastDetailPage => broadcast::DETAIL_SIGNATURE,
            Self::CommentStreamResponse => comment::SIGNATURE,
            Self::PremierListPage => premier::LIST_SIGNATURE,
            Self::PremierItemPage => premier::ITEM_SIGNATURE,
        }
    }

    /// Validate a raw response and turn it into a payload for this kind
    ///
    /// Fails with [`FetchError::Missing`] for a well-formed "no such resource"
    /// answer, [`FetchError::Throttled`] for the platform's throttle page, and
    /// [`FetchError::UnexpectedResponse`] when the signature is absent.
    pub fn inspect(self, response: HttpResponse) -> Result<Payload, FetchError> {
        let url = response.url;
        if let Some(content_type) = response
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.to_ascii_lowercase())
        {
            let is_json = content_type.contains("json");
            let is_html = content_type.contains("html");
            let mismatch = match self.content() {
                ContentKind::Json => is_html,
                ContentKind::Html => is_json,
            };
            if mismatch {
                return Err(FetchError::UnexpectedResponse {
                    url,
                    kind: self,
                    reason: format!("unexpected content type '{content_type}'"),
                });
            }
        }

        match self.content() {
            ContentKind::Html => {
                self.check_html(&url, &response.body)?;
                Ok(Payload {
                    url,
                    kind: self,
                    body: Body::Html(response.body),
                })
            }
            ContentKind::Json => {
                let value = self.check_json(&url, &response.body)?;
                Ok(Payload {
                    url,
                    kind: self,
                    body: Body::Json(value),
                })
            }
        }
    }

    fn check_html(self, url: &str, body: &str) -> Result<(), FetchError> {
        let document = Html::parse_document(body);
        let select = |css: &str| {
            Selector::parse(css)
                .ok()
                .and_then(|selector| document.select(&selector).next())
        };

        if let Some(error_page) = select(ERROR_PAGE_SELECTOR) {
            let code = error_page.value().attr("data-status").unwrap_or_default();
            if NOT_FOUND_CODES.contains(&code) {
                return Err(FetchError::Missing {
                    url: url.to_string(),
                    kind: self,
                });
            }
            if THROTTLED_CODES.contains(&code) {
                return Err(FetchError::Throttled {
                    url: url.to_string(),
                    retry_after: None,
                });
            }
        }

        if select(self.signature()).is_none() {
            return Err(FetchError::UnexpectedResponse {
                url: url.to_string(),
                kind: self,
                reason: format!("signature '{}' not found", self.signature()),
            });
        }
        Ok(())
    }

    fn check_json(self, url: &str, body: &str) -> Result<Value, FetchError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| FetchError::UnexpectedResponse {
                url: url.to_string(),
                kind: self,
                reason: format!("invalid JSON: {e}"),
            })?;

        if let Some(code) = value.pointer("/error/code") {
            let code = match code {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if NOT_FOUND_CODES.contains(&code.as_str()) || code == "not_found" {
                return Err(FetchError::Missing {
                    url: url.to_string(),
                    kind: self,
                });
            }
            if THROTTLED_CODES.contains(&code.as_str()) || code == "too_many_requests" {
                return Err(FetchError::Throttled {
                    url: url.to_string(),
                    retry_after: None,
                });
            }
        }

        if value.get(self.signature()).is_none() {
            return Err(FetchError::UnexpectedResponse {
                url: url.to_string(),
                kind: self,
                reason: format!("key '{}' not found", self.signature()),
            });
        }
        Ok(value)
    }
}

/// Body of a validated response
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Html(String),
    Json(Value),
}

/// A validated response, tagged with its origin for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub url: String,
    pub kind: PageKind,
    pub body: Body,
}

impl Payload {
    pub fn html(&self) -> Option<&str> {
        match &self.body {
            Body::Html(html) => Some(html),
            Body::Json(_) => None,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            Body::Html(_) => None,
        }
    }

    pub(crate) fn html_body(&self) -> Result<&str, ParseError> {
        self.html()
            .ok_or_else(|| ParseError::missing("body", "text/html"))
    }

    pub(crate) fn json_body(&self) -> Result<&Value, ParseError> {
        self.json()
            .ok_or_else(|| ParseError::missing("body", "application/json"))
    }
}

/// One page of a listing as produced by a list parser
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Items of this page that were dropped
    pub failures: Vec<ParseError>,
    /// Cursor of the following page, `None` on the last one
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, failures: Vec<ParseError>, next: Option<PageCursor>) -> Self {
        Self {
            items,
            failures,
            next,
        }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, Vec::new(), None)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.failures.is_empty()
    }

    /// Split per-item results into successes and failures, keeping order
    pub(crate) fn from_results(
        results: impl IntoIterator<Item = Result<T, ParseError>>,
        next: Option<PageCursor>,
    ) -> Self {
        let mut items = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(item) => items.push(item),
                Err(error) => failures.push(error),
            }
        }
        Self::new(items, failures, next)
    }
}

/// Request-side facts a parser needs but the payload does not carry
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Base for resolving relative links
    pub base_url: Url,
    /// Cursor the page was requested with; `None` for the first page
    pub cursor: Option<PageCursor>,
    /// Broadcast a comment feed belongs to
    pub broadcast: Option<BroadcastId>,
}

impl ParseContext {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            cursor: None,
            broadcast: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<PageCursor>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastId) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// Zero-based page index of the current page
    pub(crate) fn page_index(&self) -> u32 {
        match self.cursor {
            Some(PageCursor::Page(index)) => index,
            _ => 0,
        }
    }

    pub(crate) fn resolve(&self, href: &str) -> Option<String> {
        crate::urls::resolve(&self.base_url, href)
    }
}

/// Output of [`parse`], one variant per page kind
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    User(User),
    Broadcasts(Page<Broadcast>),
    Broadcast(Broadcast),
    Comments(Page<Comment>),
    PremierLinks(Page<String>),
    PremierItem(PremierItem),
}

/// Parse a validated payload with the parser of its kind
///
/// A page-level error (for example a listing without its owner) is returned as
/// `Err`; item-level errors of list kinds are collected in [`Page::failures`].
pub fn parse(payload: &Payload, context: &ParseContext) -> Result<Parsed, ParseError> {
    match payload.kind {
        PageKind::UserProfilePage => {
            parse_user_profile(payload.html_body()?, context).map(Parsed::User)
        }
        PageKind::BroadcastListPage => {
            parse_broadcast_list(payload.html_body()?, context).map(Parsed::Broadcasts)
        }
        PageKind::BroadcastDetailPage => {
            parse_broadcast_detail(payload.html_body()?, context).map(Parsed::Broadcast)
        }
        PageKind::CommentStreamResponse => {
            parse_comment_stream(payload.json_body()?, context).map(Parsed::Comments)
        }
        PageKind::PremierListPage => {
            parse_premier_list(payload.html_body()?, context).map(Parsed::PremierLinks)
        }
        PageKind::PremierItemPage => {
            parse_premier_item(payload.html_body()?, &payload.url, context)
                .map(Parsed::PremierItem)
        }
    }
}
