//! Pagination types and traits
//!
//! Defines the contract between the orchestrator and a listing source.

use crate::error::Result;
use crate::types::{Cursor, RawItem, ScrapeTarget};
use async_trait::async_trait;

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Items in provider order
    pub items: Vec<RawItem>,
    /// Cursor for the following page, `None` once the listing is exhausted
    pub next_cursor: Option<Cursor>,
}

impl Page {
    /// Create a page
    pub fn new(items: Vec<RawItem>, next_cursor: Option<Cursor>) -> Self {
        Self { items, next_cursor }
    }

    /// A page with no items and no continuation
    pub fn exhausted() -> Self {
        Self::default()
    }

    /// Check if this page ends the pass
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Number of items on the page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the page has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Walks a listing one page at a time.
///
/// Implementations must wait on the shared rate limiter before every network
/// call and must not retry: transient failures are returned as retryable
/// errors so backoff stays in one place. Restarting a listing means calling
/// `fetch_page` again with a stored cursor.
#[async_trait]
pub trait Paginator: Send + Sync {
    /// Fetch the page that follows `cursor` (or the first page)
    async fn fetch_page(&self, target: &ScrapeTarget, cursor: Option<&Cursor>) -> Result<Page>;
}
