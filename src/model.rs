//! Domain records produced by the page parsers
//!
//! Every record is an immutable value built from exactly one response payload.
//! References between records (a broadcast's owner, a comment's broadcast) are
//! identifiers, never owned values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValueError;

/// Stable account identifier assigned by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Movie identifier of a live or past broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(pub u64);

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub u64);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Display name; falls back to the screen id when the page has none
    pub name: String,
    /// Handle used in profile URLs, without a leading `@`
    pub screen_id: String,
    pub profile_url: String,
    pub followers: u64,
    pub following: u64,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// Lifecycle state of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    Scheduled,
    Live,
    Ended,
}

impl BroadcastStatus {
    /// Whether a later observation may report `next` after `self`
    ///
    /// Status only moves forward: scheduled → live → ended. Observing the same
    /// status again is always allowed, and a scheduled broadcast may be seen as
    /// ended directly when the live phase fell between two fetches.
    pub fn can_transition_to(self, next: BroadcastStatus) -> bool {
        self.rank() <= next.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Self::Scheduled => 0,
            Self::Live => 1,
            Self::Ended => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Ended => "ended",
        }
    }
}

impl std::str::FromStr for BroadcastStatus {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "onair" | "on_air" => Ok(Self::Live),
            "ended" | "archive" | "recorded" | "offline" => Ok(Self::Ended),
            "scheduled" | "reserved" | "upcoming" => Ok(Self::Scheduled),
            _ => Err(ValueError::InvalidStatus {
                text: s.to_string(),
            }),
        }
    }
}

/// A live, past, or scheduled broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: BroadcastId,
    /// Owning user, by identifier only
    pub owner: UserId,
    /// Screen id of the owner, needed to build the broadcast's URLs
    pub owner_screen_id: String,
    pub title: String,
    pub started_at: Option<DateTime<Utc>>,
    pub viewers: u64,
    pub status: BroadcastStatus,
    pub thumbnail_url: Option<String>,
    pub url: String,
}

impl Broadcast {
    /// Whether `later` is a plausible re-observation of this broadcast
    pub fn is_valid_successor(&self, later: &Broadcast) -> bool {
        self.id == later.id && self.status.can_transition_to(later.status)
    }
}

/// Who wrote a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CommentAuthor {
    /// A registered account; counts and bio are not part of comment payloads
    /// and are left at their defaults
    User(User),
    /// A guest posting under a free-form name
    Anonymous { handle: String },
}

impl CommentAuthor {
    pub fn display_name(&self) -> &str {
        match self {
            Self::User(user) => &user.name,
            Self::Anonymous { handle } => handle,
        }
    }
}

/// A comment posted on a broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    /// Broadcast this comment belongs to, by identifier only
    pub broadcast: BroadcastId,
    pub author: CommentAuthor,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    /// Zero-based position in the broadcast's comment stream
    pub sequence: u64,
}

/// Where the next page of a listing starts
///
/// Produced by the parser of the previous page; `None` in its place means the
/// listing is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageCursor {
    /// Opaque continuation token handed out by the upstream
    Token(String),
    /// Zero-based page index
    Page(u32),
    Offset { offset: u64, limit: u64 },
}

/// Items of a listing together with the entries that could not be produced
///
/// For parsed listings the failures are the dropped items' [`ParseError`]s.
/// Operations that fetch one page per item record the failed fetches instead.
///
/// [`ParseError`]: crate::ParseError
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T, E = crate::ParseError> {
    pub items: Vec<T>,
    pub failures: Vec<E>,
}

impl<T, E> Listing<T, E> {
    pub fn new(items: Vec<T>, failures: Vec<E>) -> Self {
        Self { items, failures }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T, E> Default for Listing<T, E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// A ticket offered for a Premier item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremierTicket {
    pub title: Option<String>,
    /// Displayed price with the "(tax included)" note removed
    pub price: Option<String>,
}

/// A paid Premier broadcast listed in the platform's shop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremierItem {
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_url: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub available_until: Option<String>,
    pub archive_sales_deadline: Option<String>,
    pub tickets: Vec<PremierTicket>,
}

/// Genres of the Premier shop, with the numeric codes the shop uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PremierGenre {
    Music = 1,
    TheaterComedy = 2,
    Sports = 3,
    Event = 11,
    Other = 99,

    Rock = 101,
    VisualKei = 102,
    Idol = 103,
    JPop = 105,
    JazzFusion = 107,
    AnimeSong = 109,
    Classic = 116,
    ChorusAcappella = 117,
    WindMusic = 118,
    Vtuber = 119,
    Acoustic = 120,
    OtherMusic = 121,

    Play = 201,
    Musical = 202,
    ClassicalPerformingArts = 204,
    Dance = 205,
    ReadingAloud = 206,
    Comedy = 207,
    Rakugo = 208,
    OtherTheaterComedy = 299,

    MartialArts = 302,
    OtherSports = 399,

    Game = 1101,
    AnimeEvent = 1102,
    TalkShow = 1103,
    OtherEvent = 1199,
}

impl PremierGenre {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Top-level genre this genre belongs to
    pub fn parent(self) -> PremierGenre {
        match self.code() {
            101..=199 => Self::Music,
            201..=299 => Self::TheaterComedy,
            301..=399 => Self::Sports,
            1101..=1199 => Self::Event,
            _ => self,
        }
    }
}

/// The single criterion a Premier shop search is keyed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PremierSearch {
    Term(String),
    Date(chrono::NaiveDate),
    Genre(PremierGenre),
}

impl PremierSearch {
    /// Query parameter the shop expects for this criterion
    pub fn query_pair(&self) -> (&'static str, String) {
        match self {
            Self::Term(term) => ("search", term.clone()),
            Self::Date(date) => ("date", date.format("%Y%m%d").to_string()),
            Self::Genre(genre) => ("genre", genre.code().to_string()),
        }
    }
}
