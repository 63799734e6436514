mod common;

use apikit::{
    ApiError, ConfigPatch, PaginationOptions, Paginator, ReactiveClient, RequestOptions,
    ResponseEnvelope,
};
use apikit_core::token::MemoryTokenStore;
use common::StubTransport;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

#[tokio::test]
async fn test_reactive_success_publishes_data() {
    let stub = StubTransport::ok(200, json!({"id": 1}));
    let client = ReactiveClient::new(stub.handle("https://api.test"));
    let mut updates = client.subscribe();

    let request = client.get("/users/1", RequestOptions::new());
    assert_eq!(client.pending_count(), 1);
    assert!(client.snapshot().loading);

    let response = request.finished().await.unwrap();
    assert_eq!(response.status, 200);

    updates.changed().await.unwrap();
    let state = client.snapshot();
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert_eq!(state.data.and_then(|d| d.as_json().cloned()), Some(json!({"id": 1})));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reactive_cancel_in_flight() {
    let stub = StubTransport::slow(Duration::from_secs(30), json!({}));
    let handle = stub.handle("https://api.test");
    handle.configure(ConfigPatch::new().retry(3)).unwrap();
    let client = ReactiveClient::new(handle);

    let request = client.post("/jobs", &json!({"n": 1}), RequestOptions::new());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(request.cancel());

    let err = request.finished().await.unwrap_err();
    assert_eq!(err, ApiError::Cancelled);
    assert_eq!(stub.calls(), 1);

    let state = client.snapshot();
    assert_eq!(state.error, Some(ApiError::Cancelled));
    assert!(!state.loading);
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reactive_cancel_all_only_reaches_owned_tokens() {
    let stub = StubTransport::slow(Duration::from_secs(5), json!("done"));
    let client = ReactiveClient::new(stub.handle("https://api.test"));

    let owned_a = client.get("/a", RequestOptions::new());
    let owned_b = client.put("/b", &json!({}), RequestOptions::new());
    let external = client.get("/c", RequestOptions::new().cancellation(CancellationToken::new()));
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(client.cancel_all(), 2);
    assert!(owned_a.finished().await.unwrap_err().is_cancelled());
    assert!(owned_b.finished().await.unwrap_err().is_cancelled());
    assert_eq!(external.finished().await.unwrap().status, 200);
}

#[tokio::test]
async fn test_reactive_distinct_ids_for_identical_calls() {
    let stub = StubTransport::ok(200, json!({}));
    let client = ReactiveClient::new(stub.handle("https://api.test"));

    let first = client.get("/same", RequestOptions::new());
    let second = client.get("/same", RequestOptions::new());
    assert_ne!(first.id(), second.id());

    first.finished().await.unwrap();
    second.finished().await.unwrap();
    assert!(!client.snapshot().loading);
}

fn page_of(request_url: &str, total: usize) -> ResponseEnvelope {
    let url = Url::parse(request_url).unwrap();
    let query = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap()
    };
    let (page, size) = (query("page"), query("pageSize"));
    let start = (page - 1) * size;
    let items: Vec<Value> = (start..total.min(start + size)).map(|i| json!({"id": i})).collect();
    ResponseEnvelope::new(200, json!({ "data": items }))
}

#[tokio::test]
async fn test_paginator_walks_pages() {
    let stub = StubTransport::new(|request, _| Ok(page_of(&request.url, 5)));
    let handle = stub.handle("https://api.test");
    handle.configure(ConfigPatch::new().token_store(MemoryTokenStore::with_token("tok"))).unwrap();
    let paginator = Paginator::new(
        handle,
        PaginationOptions::new("/posts").page_size(2).param("sort", "new"),
    );

    assert!(paginator.load().await.unwrap());
    assert_eq!(paginator.snapshot().data.len(), 2);
    assert!(paginator.snapshot().has_more);

    assert!(paginator.next_page().await.unwrap());
    assert!(paginator.next_page().await.unwrap());

    let state = paginator.snapshot();
    assert_eq!(state.page, 3);
    assert_eq!(state.data.len(), 5);
    assert!(!state.has_more);
    assert!(!paginator.next_page().await.unwrap());
    assert_eq!(stub.calls(), 3);

    let sent = stub.last();
    assert_eq!(sent.url, "https://api.test/posts?sort=new&page=3&pageSize=2");
    assert_eq!(sent.header("Authorization"), Some("Bearer tok"));
}

#[tokio::test]
async fn test_paginator_refresh_and_reset() {
    let stub = StubTransport::new(|request, _| Ok(page_of(&request.url, 3)));
    let paginator = Paginator::new(
        stub.handle("https://api.test"),
        PaginationOptions::new("/posts").page_size(2),
    );

    paginator.load().await.unwrap();
    paginator.next_page().await.unwrap();
    assert_eq!(paginator.snapshot().data.len(), 3);

    assert!(paginator.refresh().await.unwrap());
    let state = paginator.snapshot();
    assert_eq!(state.page, 1);
    assert_eq!(state.data.len(), 2);

    paginator.next_page().await.unwrap();
    assert!(paginator.prev_page().await.unwrap());
    assert_eq!(paginator.snapshot().page, 1);

    paginator.reset();
    let state = paginator.snapshot();
    assert!(state.data.is_empty());
    assert!(state.has_more);
}

#[tokio::test]
async fn test_paginator_bypasses_cache() {
    let stub = StubTransport::new(|request, _| Ok(page_of(&request.url, 1)));
    let handle = stub.handle("https://api.test");
    handle.configure(ConfigPatch::new().cache_store(apikit_core::cache::MemoryCache::new())).unwrap();
    let paginator = Paginator::new(handle, PaginationOptions::new("/posts"));

    paginator.load().await.unwrap();
    paginator.refresh().await.unwrap();
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn test_paginator_rejects_non_list_payload() {
    let stub = StubTransport::ok(200, json!({"total": 0}));
    let paginator = Paginator::new(stub.handle("https://api.test"), PaginationOptions::new("/posts"));

    let err = paginator.load().await.unwrap_err();
    assert_eq!(err.status(), Some(200));
    assert!(paginator.snapshot().error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_paginator_next_page_is_noop_while_loading() {
    let stub = StubTransport::delayed(Duration::from_millis(100), |request, _| Ok(page_of(&request.url, 6)));
    let paginator = Paginator::new(
        stub.handle("https://api.test"),
        PaginationOptions::new("/posts").page_size(2),
    );
    paginator.load().await.unwrap();

    let background = paginator.clone();
    let in_flight = tokio::spawn(async move { background.next_page().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(paginator.snapshot().loading);
    assert!(!paginator.next_page().await.unwrap());
    assert!(!paginator.refresh().await.unwrap());

    assert!(in_flight.await.unwrap().unwrap());
    let state = paginator.snapshot();
    assert_eq!(state.page, 2);
    assert_eq!(state.data.len(), 4);
    assert_eq!(stub.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_paginator_reset_discards_in_flight_load() {
    let stub = StubTransport::delayed(Duration::from_millis(100), |request, _| Ok(page_of(&request.url, 6)));
    let paginator = Paginator::new(
        stub.handle("https://api.test"),
        PaginationOptions::new("/posts").page_size(2),
    );
    paginator.load().await.unwrap();

    let background = paginator.clone();
    let in_flight = tokio::spawn(async move { background.next_page().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    paginator.reset();

    assert!(!in_flight.await.unwrap().unwrap());
    let state = paginator.snapshot();
    assert_eq!(state.page, 1);
    assert!(state.data.is_empty());
    assert!(!state.loading);
    assert!(state.error.is_none());

    // A fresh load after the reset starts cleanly
    assert!(paginator.load().await.unwrap());
    let state = paginator.snapshot();
    assert_eq!(state.page, 1);
    assert_eq!(state.data, vec![json!({"id": 0}), json!({"id": 1})]);
    assert_eq!(stub.calls(), 3);
}
