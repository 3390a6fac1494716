use scraper::Html;

use super::ParseContext;
use crate::{Count, ElementRef, FromHtml, ParseError, User, UserId};

pub(crate) const SIGNATURE: &str = "div.tw-user-nav";

const ID_ATTR: &str = "data-user-id";
const NAME_SELECTOR: &str = ".tw-user-nav-name";
const SCREEN_ID_SELECTOR: &str = ".tw-user-nav-screen-id";
const BIO_SELECTOR: &str = ".tw-user-nav-bio";
const AVATAR_SELECTOR: &str = "img.tw-user-nav-icon";
const FOLLOWERS_SELECTOR: &str = ".tw-user-nav-follower-count";
const FOLLOWING_SELECTOR: &str = ".tw-user-nav-following-count";

/// Parse a user's profile page
///
/// The account id and screen id are required. Counts default to 0 when absent,
/// the display name falls back to the screen id.
pub fn parse_user_profile(html: &str, context: &ParseContext) -> Result<User, ParseError> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let nav = root
        .select_one(SIGNATURE)
        .ok_or_else(|| ParseError::missing("profile", SIGNATURE))?;

    let id = nav
        .attr(ID_ATTR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ParseError::missing("id", &format!("{SIGNATURE}[{ID_ATTR}]")))?;

    let screen_id = nav
        .select_text(SCREEN_ID_SELECTOR)
        .map(|text| text.trim_start_matches('@').to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ParseError::missing("screen_id", SCREEN_ID_SELECTOR))?;

    let name = nav
        .select_text(NAME_SELECTOR)
        .unwrap_or_else(|| screen_id.clone());

    let followers = count_field(&nav, "followers", FOLLOWERS_SELECTOR)?;
    let following = count_field(&nav, "following", FOLLOWING_SELECTOR)?;

    let bio = nav
        .select_one(BIO_SELECTOR)
        .map(|el| el.text_with_line_breaks())
        .filter(|bio| !bio.is_empty());

    let avatar_url = nav
        .select_attr(AVATAR_SELECTOR, "src")
        .and_then(|src| context.resolve(&src));

    Ok(User {
        id: UserId(id.to_string()),
        name,
        profile_url: crate::urls::profile_url(&context.base_url, &screen_id),
        screen_id,
        followers,
        following,
        bio,
        avatar_url,
    })
}

/// Read an abbreviated count; absent means 0, present but unreadable is an error
pub(crate) fn count_field<E: ElementRef>(
    element: &E,
    field: &str,
    selector: &str,
) -> Result<u64, ParseError> {
    match element.select_text(selector) {
        None => Ok(0),
        Some(text) => Count::from_text(&text)
            .map(Count::get)
            .map_err(|error| ParseError::invalid(field, &text, error)),
    }
}
