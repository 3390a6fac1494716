use chrono::{DateTime, Utc};
use scraper::Html;

use super::{Page, ParseContext, user::count_field};
use crate::{
    Broadcast, BroadcastId, BroadcastStatus, ElementRef, FromHtml, PageCursor, ParseError, UserId,
    extract::parse_numeric_id, urls,
};

pub(crate) const LIST_SIGNATURE: &str = "div.tw-movie-list";
pub(crate) const DETAIL_SIGNATURE: &str = "div.tw-movie-detail";

const USER_ID_ATTR: &str = "data-user-id";
const SCREEN_ID_ATTR: &str = "data-screen-id";
const STATUS_ATTR: &str = "data-status";

const ITEM_SELECTOR: &str = "a.tw-movie-thumbnail";
const ITEM_TITLE_SELECTOR: &str = ".tw-movie-thumbnail-title";
const ITEM_DATE_SELECTOR: &str = "time.tw-movie-thumbnail-date";
const ITEM_VIEW_SELECTOR: &str = ".tw-movie-thumbnail-view";
const ITEM_IMAGE_SELECTOR: &str = "img.tw-movie-thumbnail-image";
const PAGER_LINK_SELECTOR: &str = "div.tw-pager a";

const DETAIL_ID_ATTR: &str = "data-movie-id";
const DETAIL_TITLE_SELECTOR: &str = ".tw-movie-detail-title";
const DETAIL_DATE_SELECTOR: &str = "time.tw-movie-detail-date";
const DETAIL_VIEW_SELECTOR: &str = ".tw-movie-detail-view";
const OG_IMAGE_SELECTOR: &str = r#"meta[property="og:image"]"#;

/// Owner of every broadcast on a page, from the container's data attributes
struct Owner {
    id: UserId,
    screen_id: String,
}

fn owner_of<E: ElementRef>(container: &E, signature: &str) -> Result<Owner, ParseError> {
    let attr = |name: &str| {
        container
            .attr(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ParseError::missing(name, &format!("{signature}[{name}]")))
    };
    Ok(Owner {
        id: UserId(attr(USER_ID_ATTR)?),
        screen_id: attr(SCREEN_ID_ATTR)?,
    })
}

/// Status from a `data-status` attribute; absent means the broadcast is over
fn status_of<E: ElementRef>(element: &E) -> Result<BroadcastStatus, ParseError> {
    match element.attr(STATUS_ATTR).map(str::trim) {
        None | Some("") => Ok(BroadcastStatus::Ended),
        Some(text) => text
            .parse()
            .map_err(|error| ParseError::invalid("status", text, error)),
    }
}

fn started_at<E: ElementRef>(
    element: &E,
    selector: &str,
) -> Result<Option<DateTime<Utc>>, ParseError> {
    let Some(time) = element.select_one(selector) else {
        return Ok(None);
    };
    let raw = match time.attr("datetime") {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => time.text(),
    };
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::<Utc>::from_text(&raw)
        .map(Some)
        .map_err(|error| ParseError::invalid("started_at", &raw, error))
}

/// Parse one page of a user's broadcast listing
///
/// The owner is read once from the list container; a page without it fails as
/// a whole. Every thumbnail is parsed independently, so a thumbnail without a
/// movie link is reported in [`Page::failures`] and the others are kept.
pub fn parse_broadcast_list(
    html: &str,
    context: &ParseContext,
) -> Result<Page<Broadcast>, ParseError> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let list = root
        .select_one(LIST_SIGNATURE)
        .ok_or_else(|| ParseError::missing("broadcast list", LIST_SIGNATURE))?;
    let owner = owner_of(&list, LIST_SIGNATURE)?;

    let results = list
        .select_all(ITEM_SELECTOR)
        .iter()
        .map(|item| parse_list_item(item, &owner, context))
        .collect::<Vec<_>>();

    let total_pages = total_pages(&root);
    let current = context.page_index();
    let next = (current + 1 < total_pages).then(|| PageCursor::Page(current + 1));

    Ok(Page::from_results(results, next))
}

fn parse_list_item<E: ElementRef>(
    item: &E,
    owner: &Owner,
    context: &ParseContext,
) -> Result<Broadcast, ParseError> {
    let href = item
        .attr("href")
        .ok_or_else(|| ParseError::missing("id", &format!("{ITEM_SELECTOR}[href]")))?;
    let id = urls::movie_id_from_href(href).ok_or_else(|| {
        ParseError::invalid(
            "id",
            href,
            crate::ValueError::InvalidIdentifier {
                text: href.to_string(),
            },
        )
    })?;

    Ok(Broadcast {
        id,
        owner: owner.id.clone(),
        owner_screen_id: owner.screen_id.clone(),
        title: item.select_text(ITEM_TITLE_SELECTOR).unwrap_or_default(),
        started_at: started_at(item, ITEM_DATE_SELECTOR)?,
        viewers: count_field(item, "viewers", ITEM_VIEW_SELECTOR)?,
        status: status_of(item)?,
        thumbnail_url: item
            .select_attr(ITEM_IMAGE_SELECTOR, "src")
            .and_then(|src| context.resolve(&src)),
        url: context
            .resolve(href)
            .unwrap_or_else(|| urls::broadcast_url(&context.base_url, &owner.screen_id, id)),
    })
}

/// Number of pages announced by the pager; 1 when there is no pager
pub(crate) fn total_pages<E: ElementRef>(root: &E) -> u32 {
    root.select_all(PAGER_LINK_SELECTOR)
        .iter()
        .filter_map(|link| link.text().parse::<u32>().ok())
        .max()
        .unwrap_or(1)
        .max(1)
}

/// Parse a broadcast's own page
pub fn parse_broadcast_detail(html: &str, context: &ParseContext) -> Result<Broadcast, ParseError> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let detail = root
        .select_one(DETAIL_SIGNATURE)
        .ok_or_else(|| ParseError::missing("broadcast", DETAIL_SIGNATURE))?;

    let raw_id = detail.attr(DETAIL_ID_ATTR).ok_or_else(|| {
        ParseError::missing("id", &format!("{DETAIL_SIGNATURE}[{DETAIL_ID_ATTR}]"))
    })?;
    let id = parse_numeric_id(raw_id)
        .map(BroadcastId)
        .map_err(|error| ParseError::invalid("id", raw_id, error))?;
    let owner = owner_of(&detail, DETAIL_SIGNATURE)?;

    let thumbnail_url = root
        .select_attr(OG_IMAGE_SELECTOR, "content")
        .and_then(|src| context.resolve(&src));

    Ok(Broadcast {
        id,
        title: detail
            .select_text(DETAIL_TITLE_SELECTOR)
            .unwrap_or_default(),
        started_at: started_at(&detail, DETAIL_DATE_SELECTOR)?,
        viewers: count_field(&detail, "viewers", DETAIL_VIEW_SELECTOR)?,
        status: status_of(&detail)?,
        thumbnail_url,
        url: urls::broadcast_url(&context.base_url, &owner.screen_id, id),
        owner: owner.id,
        owner_screen_id: owner.screen_id,
    })
}
