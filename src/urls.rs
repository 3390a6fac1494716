//! URL construction and normalization

use url::Url;

use crate::{BroadcastId, PremierSearch};

pub const DEFAULT_BASE_URL: &str = "https://twitcasting.tv";
pub const DEFAULT_API_BASE_URL: &str = "https://frontendapi.twitcasting.tv";

/// Resolve a possibly relative or protocol-relative link against `base`
pub fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}

fn join_segments(base: &Url, segments: &[&str]) -> String {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url.to_string()
}

pub fn profile_url(base: &Url, screen_id: &str) -> String {
    join_segments(base, &[screen_id])
}

pub fn broadcast_list_url(base: &Url, screen_id: &str, page: u32) -> String {
    join_segments(base, &[screen_id, "show", &page.to_string()])
}

pub fn broadcast_url(base: &Url, screen_id: &str, id: BroadcastId) -> String {
    join_segments(base, &[screen_id, "movie", &id.to_string()])
}

pub fn comments_url(api_base: &Url, id: BroadcastId, offset: u64, limit: u64) -> String {
    let mut url = Url::parse(&join_segments(
        api_base,
        &["movies", &id.to_string(), "comments"],
    ))
    .unwrap_or_else(|_| api_base.clone());
    url.query_pairs_mut()
        .append_pair("offset", &offset.to_string())
        .append_pair("limit", &limit.to_string());
    url.to_string()
}

/// Shop search URL; the first page carries no `p` parameter
pub fn premier_search_url(base: &Url, search: &PremierSearch, page: u32) -> String {
    let mut url = Url::parse(&join_segments(base, &["shop.php"])).unwrap_or_else(|_| base.clone());
    {
        let (key, value) = search.query_pair();
        let mut query = url.query_pairs_mut();
        query.append_pair(key, &value);
        if page > 0 {
            query.append_pair("p", &page.to_string());
        }
    }
    url.to_string()
}

/// Screen id from a handle (`name`, `@name`) or a profile/movie URL
pub fn screen_id_from(input: &str) -> Option<String> {
    let input = input.trim();
    if input.contains("://") {
        let url = Url::parse(input).ok()?;
        return url
            .path_segments()?
            .find(|segment| !segment.is_empty())
            .map(str::to_string);
    }
    let handle = input.trim_start_matches('@').trim_matches('/');
    (!handle.is_empty()).then(|| handle.to_string())
}

/// Extract the movie id from a `/{screen_id}/movie/{id}` link
pub fn movie_id_from_href(href: &str) -> Option<BroadcastId> {
    let path = href.split(['?', '#']).next()?;
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let id = segments.next()?;
    if segments.next()? != "movie" {
        return None;
    }
    id.parse().ok().map(BroadcastId)
}

/// Canonical form of item URLs for de-duplication
pub struct UrlNormalizer;

impl UrlNormalizer {
    /// Drop the fragment and any trailing path slash except the root's
    ///
    /// Scheme and host case and default ports are normalized by the parser.
    /// Input that is not an absolute URL only loses its fragment.
    pub fn normalize(url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url.trim()) else {
            return url.split('#').next().unwrap_or_default().to_string();
        };
        parsed.set_fragment(None);

        let trimmed = parsed.path().trim_end_matches('/').to_string();
        if trimmed.len() < parsed.path().len() && !trimmed.is_empty() {
            parsed.set_path(&trimmed);
        }
        parsed.into()
    }
}
