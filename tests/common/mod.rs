#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use senskrap::{
    Client, TransportError,
    transport::{HttpRequest, HttpResponse, Transport},
};

pub const USER_PROFILE: &str = include_str!("../fixtures/user_profile.html");
pub const USER_PROFILE_MINIMAL: &str = include_str!("../fixtures/user_profile_minimal.html");
pub const BROADCAST_LIST: &str = include_str!("../fixtures/broadcast_list.html");
pub const BROADCAST_DETAIL: &str = include_str!("../fixtures/broadcast_detail.html");
pub const COMMENTS: &str = include_str!("../fixtures/comments.json");
pub const PREMIER_LIST: &str = include_str!("../fixtures/premier_list.html");
pub const PREMIER_EMPTY: &str = include_str!("../fixtures/premier_empty.html");
pub const PREMIER_ITEM: &str = include_str!("../fixtures/premier_item.html");
pub const ERROR_NOT_FOUND: &str = include_str!("../fixtures/error_not_found.html");
pub const REDESIGNED_PROFILE: &str = include_str!("../fixtures/redesigned_profile.html");

pub const PROFILE_URL: &str = "https://twitcasting.tv/twitcasting_jp";

/// One scripted answer
#[derive(Debug, Clone)]
pub enum Reply {
    Html(u16, String),
    Json(u16, String),
    /// Non-success status with an empty body
    Status(u16),
    /// 429 with a `Retry-After` header in seconds
    Throttled(u64),
    Timeout,
}

impl Reply {
    pub fn html(body: &str) -> Self {
        Self::Html(200, body.to_string())
    }

    pub fn json(body: &str) -> Self {
        Self::Json(200, body.to_string())
    }

    fn into_result(self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = |status: u16,
                        content_type: &str,
                        body: String,
                        extra: Vec<(String, String)>|
         -> Result<HttpResponse, TransportError> {
            let mut headers = vec![("content-type".to_string(), content_type.to_string())];
            headers.extend(extra);
            Ok(HttpResponse {
                url: url.to_string(),
                status,
                headers,
                body,
            })
        };
        match self {
            Self::Html(status, body) => response(status, "text/html; charset=utf-8", body, vec![]),
            Self::Json(status, body) => response(status, "application/json", body, vec![]),
            Self::Status(status) => response(status, "text/html", String::new(), vec![]),
            Self::Throttled(seconds) => response(
                429,
                "text/html",
                String::new(),
                vec![("retry-after".to_string(), seconds.to_string())],
            ),
            Self::Timeout => Err(TransportError::Timeout {
                url: url.to_string(),
            }),
        }
    }
}

/// Transport answering from per-URL scripts
///
/// Each URL replays its replies in order and then keeps repeating the last
/// one. Unknown URLs answer 404. Every request is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every request open for `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn on(&self, url: &str, replies: impl IntoIterator<Item = Reply>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into_iter().collect());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(replies) if replies.len() > 1 => replies.pop_front().unwrap(),
            Some(replies) => replies.front().cloned().unwrap_or(Reply::Status(404)),
            None => Reply::Status(404),
        }
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.url.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.next_reply(&request.url).into_result(&request.url)
    }
}

/// Client over `transport` with deterministic backoff
pub fn client(transport: Arc<ScriptedTransport>) -> Client {
    Client::builder()
        .transport(transport)
        .jitter(false)
        .build()
        .expect("test client should build")
}

/// Broadcast list page of `twitcasting_jp` with the given movie ids
pub fn broadcast_page(ids: &[u64], total_pages: u32) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<a class="tw-movie-thumbnail" href="/twitcasting_jp/movie/{id}" data-status="ended">
                     <span class="tw-movie-thumbnail-title">Movie {id}</span>
                     <span class="tw-movie-thumbnail-view">{id}</span>
                   </a>"#
            )
        })
        .collect();
    let pager: String = (1..=total_pages)
        .map(|n| format!(r#"<a href="/twitcasting_jp/show/{}">{n}</a>"#, n - 1))
        .collect();
    format!(
        r#"<html><body>
             <div class="tw-movie-list" data-user-id="182224938" data-screen-id="twitcasting_jp">{items}</div>
             <div class="tw-pager">{pager}</div>
           </body></html>"#
    )
}

/// Comment feed page with sequential ids starting at `first_id`
pub fn comment_page(first_id: u64, count: u64, has_next: bool) -> String {
    let comments: Vec<String> = (first_id..first_id + count)
        .map(|id| {
            format!(
                r#"{{"id": {id}, "created_at": {}, "message": "comment {id}", "anonymous_name": "guest"}}"#,
                1_719_223_200 + id
            )
        })
        .collect();
    format!(
        r#"{{"comments": [{}], "has_next": {has_next}}}"#,
        comments.join(",")
    )
}

/// Premier result page linking to the given shop item paths
pub fn premier_page(paths: &[&str], total_pages: u32) -> String {
    let items: String = paths
        .iter()
        .map(|path| format!(r#"<a class="tw-shop-item-thumbnail" href="{path}"></a>"#))
        .collect();
    let pager: String = (1..=total_pages)
        .map(|n| format!(r#"<a href="/shop.php?p={}">{n}</a>"#, n - 1))
        .collect();
    format!(
        r#"<html><body>
             <div class="tw-shop-items">{items}</div>
             <div class="tw-pager">{pager}</div>
           </body></html>"#
    )
}
