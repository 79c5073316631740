//! Listing paginator
//!
//! Walks `/r/{source}/new` and `/r/{source}/comments` with the provider's
//! `after` cursor. Responses have the shape:
//!
//! ```text
//! { "kind": "Listing",
//!   "data": { "after": "t3_abc" | null,
//!             "children": [ { "kind": "t3", "data": { ... } }, ... ] } }
//! ```
//!
//! A `threads` target walks the post listing the same way, then replaces
//! each post with its comment tree from `/comments/{post_id}`. That endpoint
//! answers with `[post_listing, comment_listing]`; nested replies sit in each
//! comment's `replies` field as another listing (or `""` when there are
//! none). `more` stubs are skipped, not expanded.

use super::types::{Page, Paginator};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::{Cursor, ItemKind, JsonValue, RawItem, ScrapeTarget};
use async_trait::async_trait;
use tracing::debug;

/// Largest page the listing endpoints serve
pub const MAX_PAGE_SIZE: u32 = 100;

/// Cursor paginator over listing endpoints
#[derive(Debug, Clone)]
pub struct ListingPaginator {
    client: HttpClient,
    page_size: u32,
}

impl ListingPaginator {
    /// Create a paginator that requests `page_size` items per page
    pub fn new(client: HttpClient, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Items requested per page
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn query(&self, cursor: Option<&Cursor>) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("limit", self.page_size.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("after", cursor.as_str().to_string()));
        }
        query
    }

    async fn fetch_listing(&self, target: &ScrapeTarget, cursor: Option<&Cursor>) -> Result<Page> {
        let url = format!("{}.json", target.kind.listing_path(&target.source));
        let body: JsonValue = self
            .client
            .get_json(&url, &self.query(cursor))
            .await?;
        parse_listing(&body)
    }

    /// One page of posts, each expanded into its comments
    async fn fetch_threads(&self, target: &ScrapeTarget, cursor: Option<&Cursor>) -> Result<Page> {
        let posts = self.fetch_listing(target, cursor).await?;

        let mut comments = Vec::new();
        for post_id in posts
            .items
            .iter()
            .filter(|item| item.thing_kind == ItemKind::Posts.thing_prefix())
            .filter_map(|item| item.external_id.as_deref())
        {
            let body: JsonValue = self
                .client
                .get_json(
                    &format!("/comments/{post_id}.json"),
                    &[("raw_json", "1".to_string())],
                )
                .await?;
            let tree = parse_comment_tree(&body)?;
            debug!(target = %target, post_id, comments = tree.len(), "Expanded thread");
            comments.extend(tree);
        }

        Ok(Page::new(comments, posts.next_cursor))
    }
}

#[async_trait]
impl Paginator for ListingPaginator {
    async fn fetch_page(&self, target: &ScrapeTarget, cursor: Option<&Cursor>) -> Result<Page> {
        let page = match target.kind {
            ItemKind::Threads => self.fetch_threads(target, cursor).await?,
            ItemKind::Posts | ItemKind::Comments => self.fetch_listing(target, cursor).await?,
        };

        debug!(
            target = %target,
            items = page.len(),
            next = page.next_cursor.as_ref().map(Cursor::as_str),
            "Fetched listing page"
        );
        Ok(page)
    }
}

/// Parse a listing body into a page
pub fn parse_listing(body: &JsonValue) -> Result<Page> {
    let data = body
        .get("data")
        .ok_or_else(|| Error::decode("listing has no data object"))?;
    let children = data
        .get("children")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| Error::decode("listing has no children array"))?;

    let items = children.iter().map(RawItem::from_child).collect();
    let next_cursor = Cursor::from_provider(data.get("after").and_then(JsonValue::as_str));

    Ok(Page::new(items, next_cursor))
}

/// Flatten a `/comments/{post_id}` response into its comments, parents
/// before their replies
pub fn parse_comment_tree(body: &JsonValue) -> Result<Vec<RawItem>> {
    let comments = body
        .as_array()
        .and_then(|parts| parts.get(1))
        .ok_or_else(|| Error::decode("comment tree is not a [post, comments] pair"))?;
    let children = listing_children(comments)
        .ok_or_else(|| Error::decode("comment tree has no children array"))?;

    let mut items = Vec::new();
    let mut skipped = 0usize;
    flatten(children, &mut items, &mut skipped);
    if skipped > 0 {
        debug!(skipped, "Skipped unexpanded comment stubs");
    }
    Ok(items)
}

fn listing_children(listing: &JsonValue) -> Option<&Vec<JsonValue>> {
    listing.get("data")?.get("children")?.as_array()
}

fn flatten(children: &[JsonValue], items: &mut Vec<RawItem>, skipped: &mut usize) {
    for child in children {
        if child.get("kind").and_then(JsonValue::as_str) == Some("more") {
            *skipped += 1;
            continue;
        }
        items.push(RawItem::from_child(child));
        // `replies` is "" on leaves
        if let Some(replies) = child
            .get("data")
            .and_then(|data| data.get("replies"))
            .and_then(listing_children)
        {
            flatten(replies, items, skipped);
        }
    }
}
