//! Common types used throughout reddit-ingest
//!
//! This module contains the shared data model: what is harvested
//! ([`ScrapeTarget`], [`ItemKind`]), what the provider hands back
//! ([`Cursor`], [`RawItem`]) and what is stored ([`Record`]).

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

// ============================================================================
// Item Kind
// ============================================================================

/// The kind of item harvested from a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Submissions, newest first
    Posts,
    /// Comments across all submissions of a source, newest first
    Comments,
    /// Every comment tree of the source's posts, walking posts newest first.
    ///
    /// Reaches comments on older posts that the `comments` stream has
    /// already scrolled past. Produces comment records.
    Threads,
}

impl ItemKind {
    /// Kinds a bare source expands to
    pub const ALL: [ItemKind; 2] = [ItemKind::Posts, ItemKind::Comments];

    /// Name used in target ids and logs
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Posts => "posts",
            ItemKind::Comments => "comments",
            ItemKind::Threads => "threads",
        }
    }

    /// Kind of the records this kind produces
    pub fn record_kind(self) -> ItemKind {
        match self {
            ItemKind::Threads => ItemKind::Comments,
            kind => kind,
        }
    }

    /// Thing prefix of the items normalized for this kind
    pub fn thing_prefix(self) -> &'static str {
        match self {
            ItemKind::Posts => "t3",
            ItemKind::Comments | ItemKind::Threads => "t1",
        }
    }

    /// Listing the cursor walks, without the `.json` suffix.
    ///
    /// `threads` pages through the post listing and expands each post.
    pub fn listing_path(self, source: &str) -> String {
        match self {
            ItemKind::Posts | ItemKind::Threads => format!("/r/{source}/new"),
            ItemKind::Comments => format!("/r/{source}/comments"),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "posts" | "post" | "submissions" => Ok(ItemKind::Posts),
            "comments" | "comment" => Ok(ItemKind::Comments),
            "threads" | "thread" => Ok(ItemKind::Threads),
            other => Err(Error::invalid_target(
                other,
                "kind must be posts, comments or threads",
            )),
        }
    }
}

// ============================================================================
// Scrape Target
// ============================================================================

/// What is being harvested: one source (subreddit) and one item kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrapeTarget {
    /// Source name without the `r/` prefix
    pub source: String,
    /// Item kind
    pub kind: ItemKind,
}

impl ScrapeTarget {
    /// Create a new target
    pub fn new(source: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            source: normalize_source(&source.into()),
            kind,
        }
    }

    /// Stable identifier, used as the checkpoint key
    pub fn id(&self) -> String {
        format!("{}:{}", self.source, self.kind)
    }

    /// Targets for every kind of one source
    pub fn all_kinds(source: &str) -> Vec<Self> {
        ItemKind::ALL
            .iter()
            .map(|kind| Self::new(source, *kind))
            .collect()
    }
}

impl fmt::Display for ScrapeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.kind)
    }
}

impl FromStr for ScrapeTarget {
    type Err = Error;

    /// Parse `source:kind`; `r/` prefixes are accepted
    fn from_str(s: &str) -> Result<Self> {
        let (source, kind) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_target(s, "expected source:kind"))?;
        let source = normalize_source(source);
        if source.is_empty() {
            return Err(Error::invalid_target(s, "source is empty"));
        }
        if !source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+')
        {
            return Err(Error::invalid_target(s, "source has invalid characters"));
        }
        Ok(Self {
            source,
            kind: kind.parse()?,
        })
    }
}

fn normalize_source(source: &str) -> String {
    let source = source.trim().trim_matches('/');
    source
        .strip_prefix("r/")
        .unwrap_or(source)
        .to_string()
}

// ============================================================================
// Cursor
// ============================================================================

/// Opaque continuation token returned by a listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a provider token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Wrap a provider token, treating empty strings as absent
    pub fn from_provider(token: Option<&str>) -> Option<Self> {
        token.filter(|t| !t.is_empty()).map(Self::new)
    }

    /// The token as sent back to the provider
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Raw Item
// ============================================================================

/// One listing child in the provider's native shape
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    /// Thing kind tag (`t3`, `t1`, ...)
    pub thing_kind: String,
    /// Provider-assigned id, if present
    pub external_id: Option<String>,
    /// Creation time in unix seconds, if present
    pub created_utc: Option<f64>,
    /// The full `data` object
    pub data: JsonValue,
}

impl RawItem {
    /// Build from a listing child (`{"kind": "t3", "data": {...}}`)
    pub fn from_child(child: &JsonValue) -> Self {
        let data = child.get("data").cloned().unwrap_or(JsonValue::Null);
        Self {
            thing_kind: child
                .get("kind")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
            external_id: data
                .get("id")
                .and_then(JsonValue::as_str)
                .filter(|id| !id.is_empty())
                .map(String::from),
            created_utc: data.get("created_utc").and_then(JsonValue::as_f64),
            data,
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// Storage-ready form of a [`RawItem`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Provider id, unique per kind
    pub external_id: String,
    /// Id of the target that produced this record
    pub target: String,
    /// Record kind, `posts` or `comments`
    pub kind: ItemKind,
    /// When the item was created upstream
    pub created_at: DateTime<Utc>,
    /// Structured fields
    pub payload: Payload,
    /// Provider JSON as fetched
    pub raw: JsonValue,
    /// When this copy was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Structured fields of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// A submission
    Post(PostFields),
    /// A comment
    Comment(CommentFields),
}

impl Payload {
    /// Current score, the field most likely to change between fetches
    pub fn score(&self) -> i64 {
        match self {
            Payload::Post(p) => p.score,
            Payload::Comment(c) => c.score,
        }
    }
}

/// Fields stored for a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostFields {
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub score: i64,
    pub num_comments: i64,
    pub permalink: String,
    pub url: Option<String>,
}

/// Fields stored for a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentFields {
    pub subreddit: String,
    /// Id of the post the comment belongs to
    pub post_id: String,
    /// Id of the parent comment or post
    pub parent_id: Option<String>,
    pub body: String,
    pub author: Option<String>,
    pub score: i64,
    pub permalink: String,
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.is_empty())
    }
}
