//! Record normalization
//!
//! Required fields per kind:
//! - posts: `id`, `created_utc`, `title`
//! - comments: `id`, `created_utc`, `body`, `link_id`
//!
//! `threads` targets yield comments and are normalized as such.
//!
//! Everything else is optional and defaulted.

use crate::types::{
    CommentFields, ItemKind, JsonValue, OptionStringExt, Payload, PostFields, RawItem, Record,
    ScrapeTarget,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Prefix that turns a relative permalink into a URL
pub const PERMALINK_BASE: &str = "https://www.reddit.com";

/// Author name the provider reports for removed accounts
const DELETED_AUTHOR: &str = "[deleted]";

/// Why an item could not be normalized
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedItem {
    #[error("item is not an object")]
    NotAnObject,

    #[error("expected thing kind '{expected}', found '{found}'")]
    WrongKind {
        expected: &'static str,
        found: String,
    },

    #[error("item {} is missing required field '{field}'", .external_id.as_deref().unwrap_or("<unknown>"))]
    MissingField {
        field: &'static str,
        external_id: Option<String>,
    },

    #[error("item {external_id} has an out-of-range timestamp {created_utc}")]
    InvalidTimestamp {
        external_id: String,
        created_utc: f64,
    },
}

/// Normalize one raw item into a record of `kind`
pub fn normalize(
    raw: &RawItem,
    target: &ScrapeTarget,
    kind: ItemKind,
    fetched_at: DateTime<Utc>,
) -> Result<Record, MalformedItem> {
    let data = raw.data.as_object().ok_or(MalformedItem::NotAnObject)?;

    if !raw.thing_kind.is_empty() && raw.thing_kind != kind.thing_prefix() {
        return Err(MalformedItem::WrongKind {
            expected: kind.thing_prefix(),
            found: raw.thing_kind.clone(),
        });
    }

    let external_id = raw.external_id.clone().ok_or(MalformedItem::MissingField {
        field: "id",
        external_id: None,
    })?;
    let missing = |field: &'static str| MalformedItem::MissingField {
        field,
        external_id: Some(external_id.clone()),
    };

    let created_utc = raw.created_utc.ok_or_else(|| missing("created_utc"))?;
    let created_at = timestamp(created_utc).ok_or_else(|| MalformedItem::InvalidTimestamp {
        external_id: external_id.clone(),
        created_utc,
    })?;

    let subreddit = string_field(data.get("subreddit")).unwrap_or_else(|| target.source.clone());
    let author = string_field(data.get("author")).filter(|a| a != DELETED_AUTHOR);
    let score = int_field(data.get("score"));
    let permalink = string_field(data.get("permalink")).unwrap_or_default();

    let payload = match kind {
        ItemKind::Posts => Payload::Post(PostFields {
            subreddit,
            title: string_field(data.get("title")).ok_or_else(|| missing("title"))?,
            body: string_field(data.get("selftext")).unwrap_or_default(),
            author,
            score,
            num_comments: int_field(data.get("num_comments")),
            permalink,
            url: string_field(data.get("url")),
        }),
        ItemKind::Comments | ItemKind::Threads => {
            let body = data
                .get("body")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| missing("body"))?
                .to_string();
            let post_id = string_field(data.get("link_id"))
                .map(|id| strip_thing_prefix(&id))
                .ok_or_else(|| missing("link_id"))?;
            Payload::Comment(CommentFields {
                subreddit,
                post_id,
                parent_id: string_field(data.get("parent_id")).map(|id| strip_thing_prefix(&id)),
                body,
                author,
                score,
                permalink: absolute_permalink(&permalink),
            })
        }
    };

    Ok(Record {
        external_id,
        target: target.id(),
        kind: kind.record_kind(),
        created_at,
        payload,
        raw: raw.data.clone(),
        fetched_at,
    })
}

/// Normalize a page of items for `target`.
///
/// Returns the surviving records in page order, deduplicated by external id
/// (a later duplicate replaces the earlier one in place), and the number of
/// items dropped as malformed.
pub fn normalize_page(
    items: &[RawItem],
    target: &ScrapeTarget,
    fetched_at: DateTime<Utc>,
) -> (Vec<Record>, usize) {
    let mut records: Vec<Record> = Vec::with_capacity(items.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut dropped = 0;

    for item in items {
        match normalize(item, target, target.kind, fetched_at) {
            Ok(record) => match positions.get(&record.external_id) {
                Some(&index) => records[index] = record,
                None => {
                    positions.insert(record.external_id.clone(), records.len());
                    records.push(record);
                }
            },
            Err(reason) => {
                dropped += 1;
                warn!(target = %target, %reason, "Dropping malformed item");
            }
        }
    }

    (records, dropped)
}

fn string_field(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_str)
        .map(String::from)
        .none_if_empty()
}

fn int_field(value: Option<&JsonValue>) -> i64 {
    match value {
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        None => 0,
    }
}

fn timestamp(created_utc: f64) -> Option<DateTime<Utc>> {
    if !created_utc.is_finite() {
        return None;
    }
    let secs = created_utc.trunc() as i64;
    let nanos = ((created_utc.fract()) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// `t3_abc` -> `abc`; ids without a thing prefix pass through
fn strip_thing_prefix(id: &str) -> String {
    match id.split_once('_') {
        Some((prefix, rest))
            if prefix.len() == 2 && prefix.starts_with('t') && !rest.is_empty() =>
        {
            rest.to_string()
        }
        _ => id.to_string(),
    }
}

fn absolute_permalink(permalink: &str) -> String {
    if permalink.is_empty() || permalink.starts_with("http") {
        permalink.to_string()
    } else {
        format!("{PERMALINK_BASE}{permalink}")
    }
}
