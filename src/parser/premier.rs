use scraper::Html;

use super::{Page, ParseContext, broadcast::total_pages};
use crate::{ElementRef, PageCursor, ParseError, PremierItem, PremierTicket};

/// Either the result grid or the empty-state notice
pub(crate) const LIST_SIGNATURE: &str = "div.tw-shop-items, div.tw-shop-empty";
pub(crate) const ITEM_SIGNATURE: &str = "div.tw-shop-item-header";

const EMPTY_STATE_SELECTOR: &str = "div.tw-shop-empty";
const THUMBNAIL_LIST_SELECTOR: &str = "a.tw-shop-item-thumbnail";

const TITLE_SELECTOR: &str = "h2.tw-shop-item-header-title";
const DATE_SELECTOR: &str = "time.tw-shop-item-header-date";
const DESCRIPTION_SELECTOR: &str = "p.tw-shop-item-description";
const AVAILABLE_UNTIL_SELECTOR: &str = "time.tw-shop-item-header-expire-date";
const IMAGE_SELECTOR: &str = "img.tw-shop-item-cover-image";
// Upstream class name, misspelling included
const ARCHIVE_DEADLINE_SELECTOR: &str = "span.tw-shop-item-header-archieve-expire-date";
const AUTHOR_SELECTOR: &str = "span.tw-shop-item-header-user-name";
const AUTHOR_URL_SELECTOR: &str = "a.tw-shop-item-header-user";
const TICKET_CONTAINER_SELECTOR: &str = ".tw-shop-ticket-button2";
const TICKET_TITLE_SELECTOR: &str = ".tw-shop-ticket-button2-title";
const TICKET_PRICE_SELECTOR: &str = ".tw-shop-ticket-button2-price";

const AVAILABLE_PERIOD_LABELS: &[&str] = &["Available Period", "視聴期間"];
const ARCHIVE_DEADLINE_LABELS: &[&str] = &["Archive sales deadline:", "アーカイブ販売期限:"];
const TAX_NOTES: &[&str] = &["(tax included)", "(税込)"];

/// Parse one page of shop search results into absolute item URLs
///
/// The empty-state notice yields an empty last page. The page count comes from
/// the pager; without a pager the search has a single page.
pub fn parse_premier_list(html: &str, context: &ParseContext) -> Result<Page<String>, ParseError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    if root.select_one(EMPTY_STATE_SELECTOR).is_some() {
        return Ok(Page::last(Vec::new()));
    }

    let results = root
        .select_all(THUMBNAIL_LIST_SELECTOR)
        .iter()
        .map(|link| {
            link.attr("href")
                .and_then(|href| context.resolve(href))
                .ok_or_else(|| {
                    ParseError::missing("url", &format!("{THUMBNAIL_LIST_SELECTOR}[href]"))
                })
        })
        .collect::<Vec<_>>();

    let current = context.page_index();
    let next = (current + 1 < total_pages(&root)).then(|| PageCursor::Page(current + 1));

    Ok(Page::from_results(results, next))
}

/// Parse a shop item page
///
/// Every field is optional; the page's own URL identifies the item.
pub fn parse_premier_item(
    html: &str,
    url: &str,
    context: &ParseContext,
) -> Result<PremierItem, ParseError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let tickets = root
        .select_all(TICKET_CONTAINER_SELECTOR)
        .iter()
        .map(|container| PremierTicket {
            title: container.select_text(TICKET_TITLE_SELECTOR),
            price: container
                .select_text(TICKET_PRICE_SELECTOR)
                .map(|price| strip_labels(&price, TAX_NOTES)),
        })
        .collect();

    Ok(PremierItem {
        url: url.to_string(),
        title: root.select_text(TITLE_SELECTOR),
        author: root.select_text(AUTHOR_SELECTOR),
        author_url: root
            .select_attr(AUTHOR_URL_SELECTOR, "href")
            .and_then(|href| context.resolve(&href)),
        date: root.select_text(DATE_SELECTOR),
        description: root
            .select_one(DESCRIPTION_SELECTOR)
            .map(|el| el.text_with_line_breaks())
            .filter(|text| !text.is_empty()),
        image_url: root
            .select_attr(IMAGE_SELECTOR, "src")
            .and_then(|src| context.resolve(&src)),
        available_until: root
            .select_text(AVAILABLE_UNTIL_SELECTOR)
            .map(|text| strip_labels(&text, AVAILABLE_PERIOD_LABELS)),
        archive_sales_deadline: root
            .select_text(ARCHIVE_DEADLINE_SELECTOR)
            .map(|text| strip_labels(&text, ARCHIVE_DEADLINE_LABELS)),
        tickets,
    })
}

fn strip_labels(text: &str, labels: &[&str]) -> String {
    labels
        .iter()
        .fold(text.to_string(), |acc, label| acc.replace(label, ""))
        .trim()
        .to_string()
}
