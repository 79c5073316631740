//! Tests for transform module

use super::*;
use crate::types::{ItemKind, Payload, RawItem, ScrapeTarget};
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn post_child(id: &str) -> RawItem {
    RawItem::from_child(&json!({
        "kind": "t3",
        "data": {
            "id": id,
            "created_utc": 1_714_564_800.0,
            "subreddit": "rust",
            "title": format!("Post {id}"),
            "selftext": "body text",
            "author": "ferris",
            "score": 42,
            "num_comments": 7,
            "permalink": format!("/r/rust/comments/{id}/post/"),
            "url": "https://example.com/article"
        }
    }))
}

fn comment_child(id: &str) -> RawItem {
    RawItem::from_child(&json!({
        "kind": "t1",
        "data": {
            "id": id,
            "created_utc": 1_714_564_900.5,
            "subreddit": "rust",
            "body": "nice crate",
            "author": "[deleted]",
            "score": 3,
            "link_id": "t3_p1",
            "parent_id": "t1_c0",
            "permalink": format!("/r/rust/comments/p1/post/{id}/")
        }
    }))
}

// ============================================================================
// Post Tests
// ============================================================================

#[test]
fn test_normalize_post() {
    let target = ScrapeTarget::new("rust", ItemKind::Posts);
    let record = normalize(&post_child("p1"), &target, ItemKind::Posts, fetched_at()).unwrap();

    assert_eq!(record.external_id, "p1");
    assert_eq!(record.target, "rust:posts");
    assert_eq!(record.kind, ItemKind::Posts);
    assert_eq!(
        record.created_at,
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    );
    assert_eq!(record.fetched_at, fetched_at());
    assert_eq!(record.raw["title"], "Post p1");

    let Payload::Post(post) = record.payload else {
        panic!("expected a post payload");
    };
    assert_eq!(post.title, "Post p1");
    assert_eq!(post.body, "body text");
    assert_eq!(post.author.as_deref(), Some("ferris"));
    assert_eq!(post.score, 42);
    assert_eq!(post.num_comments, 7);
    assert_eq!(post.permalink, "/r/rust/comments/p1/post/");
    assert_eq!(post.url.as_deref(), Some("https://example.com/article"));
}

#[test]
fn test_normalize_post_defaults() {
    let target = ScrapeTarget::new("rust", ItemKind::Posts);
    let raw = RawItem::from_child(&json!({
        "kind": "t3",
        "data": {"id": "p2", "created_utc": 1_700_000_000, "title": "Link only"}
    }));

    let record = normalize(&raw, &target, ItemKind::Posts, fetched_at()).unwrap();
    let Payload::Post(post) = record.payload else {
        panic!("expected a post payload");
    };
    assert_eq!(post.subreddit, "rust");
    assert_eq!(post.body, "");
    assert_eq!(post.author, None);
    assert_eq!(post.score, 0);
    assert_eq!(post.num_comments, 0);
    assert_eq!(post.url, None);
}

// ============================================================================
// Comment Tests
// ============================================================================

#[test]
fn test_normalize_comment() {
    let target = ScrapeTarget::new("rust", ItemKind::Comments);
    let record =
        normalize(&comment_child("c1"), &target, ItemKind::Comments, fetched_at()).unwrap();

    assert_eq!(record.external_id, "c1");
    assert_eq!(record.target, "rust:comments");
    assert_eq!(record.created_at.timestamp_subsec_millis(), 500);

    let Payload::Comment(comment) = record.payload else {
        panic!("expected a comment payload");
    };
    assert_eq!(comment.post_id, "p1");
    assert_eq!(comment.parent_id.as_deref(), Some("c0"));
    assert_eq!(comment.body, "nice crate");
    assert_eq!(comment.author, None);
    assert_eq!(comment.score, 3);
    assert_eq!(
        comment.permalink,
        "https://www.reddit.com/r/rust/comments/p1/post/c1/"
    );
}

#[test]
fn test_thread_items_become_comment_records() {
    let target = ScrapeTarget::new("rust", ItemKind::Threads);
    let items = vec![comment_child("c1"), post_child("p1")];

    let (records, dropped) = normalize_page(&items, &target, fetched_at());

    assert_eq!(dropped, 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ItemKind::Comments);
    assert_eq!(records[0].target, "rust:threads");
    assert!(matches!(records[0].payload, Payload::Comment(_)));
}

#[test]
fn test_normalize_comment_keeps_empty_body() {
    let target = ScrapeTarget::new("rust", ItemKind::Comments);
    let raw = RawItem::from_child(&json!({
        "kind": "t1",
        "data": {"id": "c2", "created_utc": 1_700_000_000, "body": "", "link_id": "p9"}
    }));

    let record = normalize(&raw, &target, ItemKind::Comments, fetched_at()).unwrap();
    let Payload::Comment(comment) = record.payload else {
        panic!("expected a comment payload");
    };
    assert_eq!(comment.body, "");
    assert_eq!(comment.post_id, "p9");
    assert_eq!(comment.parent_id, None);
    assert_eq!(comment.permalink, "");
}

// ============================================================================
// Malformed Input Tests
// ============================================================================

#[test_case(json!({"kind": "t3", "data": {"created_utc": 1.0, "title": "x"}}), "id" ; "missing id")]
#[test_case(json!({"kind": "t3", "data": {"id": "a", "title": "x"}}), "created_utc" ; "missing timestamp")]
#[test_case(json!({"kind": "t3", "data": {"id": "a", "created_utc": 1.0}}), "title" ; "missing title")]
#[test_case(json!({"kind": "t3", "data": {"id": "a", "created_utc": 1.0, "title": ""}}), "title" ; "empty title")]
fn test_post_missing_field(child: serde_json::Value, expected: &str) {
    let target = ScrapeTarget::new("rust", ItemKind::Posts);
    let err = normalize(
        &RawItem::from_child(&child),
        &target,
        ItemKind::Posts,
        fetched_at(),
    )
    .unwrap_err();

    match err {
        MalformedItem::MissingField { field, .. } => assert_eq!(field, expected),
        other => panic!("unexpected error: {other}"),
    }
}

#[test_case(json!({"kind": "t1", "data": {"id": "c", "created_utc": 1.0, "link_id": "t3_p"}}), "body" ; "missing body")]
#[test_case(json!({"kind": "t1", "data": {"id": "c", "created_utc": 1.0, "body": "hi"}}), "link_id" ; "missing link")]
fn test_comment_missing_field(child: serde_json::Value, expected: &str) {
    let target = ScrapeTarget::new("rust", ItemKind::Comments);
    let err = normalize(
        &RawItem::from_child(&child),
        &target,
        ItemKind::Comments,
        fetched_at(),
    )
    .unwrap_err();

    match err {
        MalformedItem::MissingField { field, external_id } => {
            assert_eq!(field, expected);
            assert_eq!(external_id.as_deref(), Some("c"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_wrong_kind_and_non_object() {
    let target = ScrapeTarget::new("rust", ItemKind::Posts);

    let err = normalize(&comment_child("c1"), &target, ItemKind::Posts, fetched_at()).unwrap_err();
    assert_eq!(
        err,
        MalformedItem::WrongKind {
            expected: "t3",
            found: "t1".to_string()
        }
    );

    let more = RawItem::from_child(&json!({"kind": "more"}));
    let err = normalize(&more, &target, ItemKind::Posts, fetched_at()).unwrap_err();
    assert_eq!(err, MalformedItem::NotAnObject);
}

#[test]
fn test_malformed_display() {
    let err = MalformedItem::MissingField {
        field: "title",
        external_id: Some("abc".to_string()),
    };
    assert_eq!(err.to_string(), "item abc is missing required field 'title'");

    let err = MalformedItem::MissingField {
        field: "id",
        external_id: None,
    };
    assert_eq!(err.to_string(), "item <unknown> is missing required field 'id'");
}

// ============================================================================
// Page Tests
// ============================================================================

#[test]
fn test_normalize_page_counts_dropped() {
    let target = ScrapeTarget::new("rust", ItemKind::Posts);
    let items = vec![
        post_child("p1"),
        RawItem::from_child(&json!({"kind": "t3", "data": {"id": "bad"}})),
        post_child("p2"),
        RawItem::from_child(&json!("garbage")),
    ];

    let (records, dropped) = normalize_page(&items, &target, fetched_at());

    assert_eq!(dropped, 2);
    let ids: Vec<_> = records.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
}

#[test]
fn test_normalize_page_dedups_last_wins() {
    let target = ScrapeTarget::new("rust", ItemKind::Posts);
    let mut updated = post_child("p1");
    updated.data["score"] = json!(99);
    let items = vec![post_child("p1"), post_child("p2"), updated];

    let (records, dropped) = normalize_page(&items, &target, fetched_at());

    assert_eq!(dropped, 0);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].external_id, "p1");
    assert_eq!(records[0].payload.score(), 99);
    assert_eq!(records[1].external_id, "p2");
}

#[test]
fn test_normalize_empty_page() {
    let target = ScrapeTarget::new("rust", ItemKind::Comments);
    let (records, dropped) = normalize_page(&[], &target, fetched_at());
    assert!(records.is_empty());
    assert_eq!(dropped, 0);
}
