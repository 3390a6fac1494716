//! Type conversion from page text into normalized Rust values
//!
//! This module defines the [`FromHtml`] trait and the normalization rules the
//! page parsers share: abbreviated counts, timestamps in their various page
//! representations, and numeric identifiers.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::ValueError;

/// Offset the platform renders local times in (JST, UTC+9)
const PLATFORM_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Epoch values above this are taken to be milliseconds rather than seconds
const EPOCH_MILLIS_THRESHOLD: u64 = 100_000_000_000;

const LOCAL_DATETIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const LOCAL_DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d"];

/// Trait for types that can be parsed from HTML text or attributes
///
/// # Examples
///
/// ```ignore
/// use senskrap::{Count, FromHtml};
///
/// let viewers = Count::from_text("1.2K")?;
/// assert_eq!(viewers.get(), 1200);
/// ```
pub trait FromHtml: Sized {
    /// Parse a value from HTML text content
    fn from_text(text: &str) -> Result<Self, ValueError>;

    /// Parse a value from an HTML attribute
    ///
    /// By default, it delegates to `from_text`.
    fn from_attr(attr: &str) -> Result<Self, ValueError> {
        Self::from_text(attr)
    }
}

impl FromHtml for String {
    fn from_text(text: &str) -> Result<Self, ValueError> {
        Ok(text.trim().to_string())
    }
}

// Optional values: empty or unparseable text becomes None
impl<T: FromHtml> FromHtml for Option<T> {
    fn from_text(text: &str) -> Result<Self, ValueError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(T::from_text(text).ok())
    }

    fn from_attr(attr: &str) -> Result<Self, ValueError> {
        if attr.trim().is_empty() {
            return Ok(None);
        }
        Ok(T::from_attr(attr).ok())
    }
}

/// A viewer, follower or similar count as displayed by the platform
///
/// Accepts plain integers (`"340"`), thousands separators (`"1,234"`) and
/// abbreviations (`"1.2K"`, `"3.4M"`, `"1.2万"`). Fractional results are
/// truncated toward zero: `"1.2345K"` is `1234`. Trailing unit text such as
/// `"340 views"` is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Count(pub u64);

impl Count {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl FromHtml for Count {
    fn from_text(text: &str) -> Result<Self, ValueError> {
        parse_count(text).map(Count)
    }
}

fn parse_count(text: &str) -> Result<u64, ValueError> {
    let invalid = || ValueError::InvalidCount {
        text: text.to_string(),
    };

    let mut int_digits = String::new();
    let mut frac_digits = String::new();
    let mut seen_point = false;
    let mut rest = text.trim();

    while let Some(c) = rest.chars().next() {
        match c {
            '0'..='9' if seen_point => frac_digits.push(c),
            '0'..='9' => int_digits.push(c),
            ',' if !seen_point && !int_digits.is_empty() => {}
            '.' if !seen_point => seen_point = true,
            _ => break,
        }
        rest = &rest[c.len_utf8()..];
    }

    if int_digits.is_empty() && frac_digits.is_empty() {
        return Err(invalid());
    }

    // A latin suffix only counts when it is a standalone letter, so that
    // "340 members" is not read as 340M.
    let mut suffix = rest.chars();
    let first = suffix.next();
    let standalone = !suffix.next().is_some_and(char::is_alphabetic);
    let multiplier: u64 = match first {
        Some('k' | 'K') if standalone => 1_000,
        Some('m' | 'M') if standalone => 1_000_000,
        Some('b' | 'B') if standalone => 1_000_000_000,
        Some('万') => 10_000,
        Some('億') => 100_000_000,
        _ => 1,
    };

    let int_part: u64 = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse().map_err(|_| invalid())?
    };
    let whole = int_part.checked_mul(multiplier).ok_or_else(invalid)?;

    if frac_digits.is_empty() || multiplier == 1 {
        return Ok(whole);
    }

    // Only as many fractional digits as the multiplier can resolve matter;
    // the remainder would be truncated anyway.
    let scale_digits = multiplier.ilog10() as usize;
    let kept: String = frac_digits.chars().take(scale_digits).collect();
    let frac_value: u64 = kept.parse().map_err(|_| invalid())?;
    let frac_scale = 10u64.pow(kept.len() as u32);
    let frac_part = frac_value * (multiplier / frac_scale);

    whole.checked_add(frac_part).ok_or_else(invalid)
}

impl FromHtml for DateTime<Utc> {
    fn from_text(text: &str) -> Result<Self, ValueError> {
        parse_timestamp(text)
    }
}

/// Parse any timestamp representation the platform uses
///
/// Supported: RFC 3339 (`datetime` attributes), bare epoch seconds or
/// milliseconds, and `YYYY/MM/DD HH:MM[:SS]` or `YYYY/MM/DD` in platform local
/// time. Parenthesised weekday markers such as `2024/06/24(月) 19:00` are
/// removed before parsing.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ValueError> {
    let invalid = || ValueError::InvalidTimestamp {
        text: text.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = trimmed.parse().map_err(|_| invalid())?;
        return timestamp_from_epoch(value).ok_or_else(invalid);
    }

    let cleaned = strip_parenthesised(trimmed);
    let jst = FixedOffset::east_opt(PLATFORM_UTC_OFFSET_SECS).ok_or_else(invalid)?;

    for format in LOCAL_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return jst
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(invalid);
        }
    }

    for format in LOCAL_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            let naive = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
            return jst
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(invalid);
        }
    }

    Err(invalid())
}

/// Convert an epoch value in seconds or milliseconds
///
/// Values outside chrono's representable range yield `None`.
pub fn timestamp_from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn strip_parenthesised(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '（' => depth += 1,
            ')' | '）' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a numeric identifier, tolerating surrounding whitespace
pub fn parse_numeric_id(text: &str) -> Result<u64, ValueError> {
    text.trim()
        .parse()
        .map_err(|_| ValueError::InvalidIdentifier {
            text: text.to_string(),
        })
}
