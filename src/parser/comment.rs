use serde_json::Value;

use super::{Page, ParseContext};
use crate::{
    Comment, CommentAuthor, CommentId, PageCursor, ParseError, User, UserId, ValueError,
    extract::{parse_timestamp, timestamp_from_epoch},
    urls,
};

pub(crate) const SIGNATURE: &str = "comments";

const DEFAULT_ANONYMOUS_HANDLE: &str = "anonymous";

/// Parse one page of a broadcast's comment feed
///
/// Sequence positions are `offset + index` of the raw entry, so they stay
/// strictly increasing across pages even when entries are dropped. The next
/// cursor continues after the last raw entry while the feed reports
/// `has_next`.
pub fn parse_comment_stream(
    json: &Value,
    context: &ParseContext,
) -> Result<Page<Comment>, ParseError> {
    let broadcast = context
        .broadcast
        .ok_or_else(|| ParseError::missing("broadcast", "context.broadcast"))?;
    let entries = json
        .get(SIGNATURE)
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::missing("comments", SIGNATURE))?;

    let (offset, limit) = match context.cursor {
        Some(PageCursor::Offset { offset, limit }) => (offset, limit),
        _ => (0, entries.len() as u64),
    };

    let results = entries.iter().enumerate().map(|(index, entry)| {
        let sequence = offset + index as u64;
        parse_entry(entry, sequence, context).map(|(id, author, text, posted_at)| Comment {
            id,
            broadcast,
            author,
            text,
            posted_at,
            sequence,
        })
    });

    let has_next = json
        .get("has_next")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let next = (has_next && !entries.is_empty()).then(|| PageCursor::Offset {
        offset: offset + entries.len() as u64,
        limit,
    });

    Ok(Page::from_results(results, next))
}

type Entry = (CommentId, CommentAuthor, String, chrono::DateTime<chrono::Utc>);

fn parse_entry(entry: &Value, sequence: u64, context: &ParseContext) -> Result<Entry, ParseError> {
    let id = match entry.get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => return Err(ParseError::missing("id", &format!("comments[{sequence}].id"))),
    }
    .map(CommentId)
    .ok_or_else(|| {
        let text = entry.get("id").map(Value::to_string).unwrap_or_default();
        ParseError::invalid("id", &text, ValueError::InvalidIdentifier { text: text.clone() })
    })?;

    let posted_at = match entry.get("created_at") {
        Some(Value::Number(n)) => n.as_i64().and_then(timestamp_from_epoch).ok_or_else(|| {
            let text = n.to_string();
            ParseError::invalid(
                "posted_at",
                &text,
                ValueError::InvalidTimestamp { text: text.clone() },
            )
        })?,
        Some(Value::String(s)) => {
            parse_timestamp(s).map_err(|error| ParseError::invalid("posted_at", s, error))?
        }
        _ => {
            return Err(ParseError::missing(
                "posted_at",
                &format!("comments[{sequence}].created_at"),
            ));
        }
    };

    let text = entry
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let author = match entry.get("from_user") {
        Some(user) if user.is_object() => CommentAuthor::User(parse_author(user, context)?),
        _ => CommentAuthor::Anonymous {
            handle: entry
                .get("anonymous_name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_ANONYMOUS_HANDLE)
                .to_string(),
        },
    };

    Ok((id, author, text, posted_at))
}

fn parse_author(user: &Value, context: &ParseContext) -> Result<User, ParseError> {
    let string = |key: &str| {
        user.get(key).and_then(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    let id = string("id").ok_or_else(|| ParseError::missing("author.id", "from_user.id"))?;
    let screen_id = string("screen_id")
        .ok_or_else(|| ParseError::missing("author.screen_id", "from_user.screen_id"))?;

    Ok(User {
        id: UserId(id),
        name: string("name").unwrap_or_else(|| screen_id.clone()),
        profile_url: urls::profile_url(&context.base_url, &screen_id),
        screen_id,
        followers: 0,
        following: 0,
        bio: None,
        avatar_url: string("profile_image").and_then(|src| context.resolve(&src)),
    })
}
