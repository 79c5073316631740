//! Pagination module
//!
//! Supports: provider cursor (`after`) pagination over listing endpoints,
//! optionally expanding each post into its comment tree
//!
//! # Overview
//!
//! A [`Paginator`] turns `(target, cursor)` into one [`Page`] of raw items
//! plus the cursor of the next page. The sequence is lazy and restartable:
//! resuming is just another `fetch_page` call with a checkpointed cursor.

mod listing;
mod types;

pub use listing::{parse_comment_tree, parse_listing, ListingPaginator, MAX_PAGE_SIZE};
pub use types::{Page, Paginator};
