//! Pipeline integration tests using a mock listing server
//!
//! Tests the full flow: OAuth2 token → listing pages → normalize → writer →
//! checkpoint, with in-memory storage.

use pretty_assertions::assert_eq;
use reddit_ingest::auth::{AuthConfig, OAuthClient};
use reddit_ingest::database::MemoryWriter;
use reddit_ingest::engine::RetryPolicy;
use reddit_ingest::http::{HttpClient, HttpClientConfig, RateLimiterConfig};
use reddit_ingest::pagination::ListingPaginator;
use reddit_ingest::state::{Checkpoint, CheckpointMap, CheckpointStore, MemoryCheckpointStore};
use reddit_ingest::{Cursor, ItemKind, Orchestrator, RunConfig, RunState, ScrapeTarget};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Fixtures
// ============================================================================

fn post(id: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "name": format!("t3_{id}"),
            "subreddit": "rust",
            "title": format!("Post {id}"),
            "selftext": "",
            "author": "ferris",
            "score": 10,
            "num_comments": 2,
            "permalink": format!("/r/rust/comments/{id}/post/"),
            "url": format!("https://www.reddit.com/r/rust/comments/{id}/post/"),
            "created_utc": 1_700_000_000.0
        }
    })
}

fn comment(id: &str) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "name": format!("t1_{id}"),
            "subreddit": "rust",
            "body": format!("Comment {id}"),
            "author": "[deleted]",
            "score": 1,
            "link_id": "t3_p1",
            "parent_id": "t3_p1",
            "permalink": format!("/r/rust/comments/p1/post/{id}/"),
            "created_utc": 1_700_000_100
        }
    })
}

fn listing(children: Vec<Value>, after: Option<&str>) -> Value {
    json!({"kind": "Listing", "data": {"after": after, "children": children}})
}

fn client_for(server: &MockServer, auth: AuthConfig) -> HttpClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .rate_limit(RateLimiterConfig::unthrottled())
        .user_agent("reddit-ingest-tests/0.1")
        .build();
    HttpClient::with_auth(config, auth).unwrap()
}

fn orchestrator(
    server: &MockServer,
    auth: AuthConfig,
    writer: &MemoryWriter,
    checkpoints: &MemoryCheckpointStore,
) -> Orchestrator {
    let paginator = ListingPaginator::new(client_for(server, auth), 2);
    Orchestrator::new(
        Arc::new(paginator),
        Arc::new(writer.clone()),
        Arc::new(checkpoints.clone()),
    )
    .with_config(RunConfig::new().with_retry(RetryPolicy::new(
        3,
        Duration::from_millis(1),
        Duration::from_millis(5),
    )))
}

// ============================================================================
// Full Run
// ============================================================================

#[tokio::test]
async fn test_authenticated_run_walks_every_page() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123",
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "read"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .and(header("Authorization", "Bearer tok-123"))
        .and(query_param("limit", "2"))
        .and(query_param_is_missing("after"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(vec![post("p1"), post("p2")], Some("t3_p2"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .and(header("Authorization", "Bearer tok-123"))
        .and(query_param("after", "t3_p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("p3")], None)))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthConfig::client_credentials(
        OAuthClient::new(format!("{}/api/v1/access_token", server.uri()), "client", "secret")
            .with_scopes(vec!["read".to_string()]),
    );
    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::new();
    let target = ScrapeTarget::new("rust", ItemKind::Posts);

    let summary = orchestrator(&server, auth, &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.dropped, 0);

    assert_eq!(writer.count(ItemKind::Posts).await, 3);
    let stored = writer.get(ItemKind::Posts, "p3").await.unwrap();
    assert_eq!(stored.target, "rust:posts");

    let checkpoint = checkpoints.load(&target).await.unwrap().unwrap();
    assert!(checkpoint.is_pass_complete());
    assert_eq!(checkpoint.last_external_id.as_deref(), Some("p3"));
}

#[tokio::test]
async fn test_resume_requests_checkpointed_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/comments.json"))
        .and(query_param("after", "t1_c2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(listing(vec![comment("c3")], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/comments.json"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![], None)))
        .expect(0)
        .mount(&server)
        .await;

    let target = ScrapeTarget::new("rust", ItemKind::Comments);
    let mut seeded = CheckpointMap::new();
    seeded.insert(
        target.id(),
        Checkpoint::new(Some(Cursor::new("t1_c2")), Some("c2".to_string())),
    );
    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::with_checkpoints(seeded);

    let summary = orchestrator(&server, AuthConfig::None, &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.pages, 1);

    let stored = writer.get(ItemKind::Comments, "c3").await.unwrap();
    assert_eq!(
        stored.raw["permalink"],
        json!("/r/rust/comments/p1/post/c3/")
    );

    let checkpoint = checkpoints.load(&target).await.unwrap().unwrap();
    assert_eq!(checkpoint.last_cursor, None);
    assert_eq!(checkpoint.last_external_id.as_deref(), Some("c3"));
}

#[tokio::test]
async fn test_rerun_updates_instead_of_duplicating() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(listing(vec![post("p1"), post("p2")], None)),
        )
        .mount(&server)
        .await;

    let writer = MemoryWriter::new();
    let target = ScrapeTarget::new("rust", ItemKind::Posts);

    let first = orchestrator(&server, AuthConfig::None, &writer, &MemoryCheckpointStore::new())
        .run(&target)
        .await;
    let second = orchestrator(&server, AuthConfig::None, &writer, &MemoryCheckpointStore::new())
        .run(&target)
        .await;

    assert_eq!((first.inserted, first.updated), (2, 0));
    assert_eq!((second.inserted, second.updated), (0, 2));
    assert_eq!(writer.len().await, 2);
}

#[tokio::test]
async fn test_threads_store_comments_of_every_post() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(listing(vec![post("p1")], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut reply = comment("c2");
    reply["data"]["parent_id"] = json!("t1_c1");
    let mut top = comment("c1");
    top["data"]["replies"] = listing(vec![reply], None);
    Mock::given(method("GET"))
        .and(path("/comments/p1.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([listing(vec![post("p1")], None), listing(vec![top], None)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::new();
    let target = ScrapeTarget::new("rust", ItemKind::Threads);

    let summary = orchestrator(&server, AuthConfig::None, &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.inserted, 2);
    assert_eq!(writer.count(ItemKind::Comments).await, 2);
    assert_eq!(writer.count(ItemKind::Posts).await, 0);

    let stored = writer.get(ItemKind::Comments, "c2").await.unwrap();
    assert_eq!(stored.target, "rust:threads");
    let reddit_ingest::Payload::Comment(fields) = stored.payload else {
        panic!("expected a comment");
    };
    assert_eq!(fields.post_id, "p1");
    assert_eq!(fields.parent_id.as_deref(), Some("c1"));
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("p1")], None)))
        .mount(&server)
        .await;

    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::new();
    let target = ScrapeTarget::new("rust", ItemKind::Posts);

    let summary = orchestrator(&server, AuthConfig::None, &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.retries, 1);
    assert_eq!(summary.count(RunState::Backoff), 1);
    assert_eq!(writer.len().await, 1);
}

fn app_credentials(server: &MockServer) -> AuthConfig {
    AuthConfig::client_credentials(OAuthClient::new(
        format!("{}/api/v1/access_token", server.uri()),
        "client",
        "secret",
    ))
}

async fn token_ok(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_unavailable_token_endpoint_is_backed_off() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    token_ok(&server, "tok").await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("p1")], None)))
        .expect(1)
        .mount(&server)
        .await;

    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::new();
    let target = ScrapeTarget::new("rust", ItemKind::Posts);

    let summary = orchestrator(&server, app_credentials(&server), &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Done, "{:?}", summary.error);
    assert_eq!(summary.retries, 1);
    assert_eq!(summary.count(RunState::Backoff), 1);
    assert_eq!(writer.len().await, 1);
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_retried() {
    let server = MockServer::start().await;
    token_ok(&server, "tok").await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("p1")], None)))
        .expect(1)
        .mount(&server)
        .await;

    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::new();
    let target = ScrapeTarget::new("rust", ItemKind::Posts);

    let summary = orchestrator(&server, app_credentials(&server), &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Done, "{:?}", summary.error);
    assert_eq!(summary.retries, 1);
    assert_eq!(writer.len().await, 1);

    let token_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/v1/access_token")
        .count();
    assert_eq!(token_requests, 2);
}

#[tokio::test]
async fn test_forbidden_source_fails_without_checkpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/private/new.json"))
        .respond_with(ResponseTemplate::new(403).set_body_string("private"))
        .expect(1)
        .mount(&server)
        .await;

    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::new();
    let target = ScrapeTarget::new("private", ItemKind::Posts);

    let summary = orchestrator(&server, AuthConfig::None, &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(summary.retries, 0);
    assert!(summary.error.as_deref().unwrap_or_default().contains("403"));
    assert!(writer.is_empty().await);
    assert_eq!(checkpoints.load(&target).await.unwrap(), None);
}

#[tokio::test]
async fn test_bad_credentials_fail_the_target() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("p1")], None)))
        .expect(0)
        .mount(&server)
        .await;

    let auth = AuthConfig::password(
        OAuthClient::new(format!("{}/api/v1/access_token", server.uri()), "client", "secret"),
        "bot",
        "wrong",
    );
    let writer = MemoryWriter::new();
    let checkpoints = MemoryCheckpointStore::new();
    let target = ScrapeTarget::new("rust", ItemKind::Posts);

    let summary = orchestrator(&server, auth, &writer, &checkpoints)
        .run(&target)
        .await;

    assert_eq!(summary.state, RunState::Failed);
    assert!(summary
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("invalid_grant"));
}
