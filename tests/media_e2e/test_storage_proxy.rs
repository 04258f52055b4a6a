//! E2E tests: storage proxy resolution.

use std::sync::Arc;

use actix_web::http::header;
use actix_web::test;
use tempfile::tempdir;

use super::test_helpers::*;

/// (1) Canonical object is served with cache and source headers.
#[actix_rt::test]
async fn test_canonical_object_served() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    let store = InMemoryStore::default().with_object("CALENDAR", "events/foo.jpg", b"jpeg-bytes");
    let app = create_test_app(Arc::new(store), legacy.path(), production.path()).await;

    let req = test::TestRequest::get()
        .uri("/api/storage-proxy/CALENDAR/events/foo.jpg")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        &format!("public, max-age={}", TEST_CACHE_MAX_AGE)
    );
    assert_eq!(resp.headers().get("x-media-source").unwrap(), "canonical");
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/jpeg");
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"jpeg-bytes");
}

/// (2) Object missing, file still in the legacy directory.
#[actix_rt::test]
async fn test_legacy_local_fallback() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    write_file(legacy.path(), "forum/thread.png", b"legacy-png");
    let app = create_test_app(
        Arc::new(InMemoryStore::default()),
        legacy.path(),
        production.path(),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/storage-proxy/FORUM/forum/thread.png")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-media-source").unwrap(), "legacy-local");
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"legacy-png");
}

/// (3) Object stored under a bucket-absolute alternate key.
#[actix_rt::test]
async fn test_alternate_key_fallback() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    let store = InMemoryStore::default().with_object("CALENDAR", "calendar/party.jpg", b"alt");
    let app = create_test_app(Arc::new(store), legacy.path(), production.path()).await;

    let req = test::TestRequest::get()
        .uri("/api/storage-proxy/CALENDAR/events/party.jpg")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-media-source").unwrap(), "alternate-key");
}

/// (4) Nothing matches: 404 with a generic body.
#[actix_rt::test]
async fn test_miss_returns_generic_404() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    let app = create_test_app(
        Arc::new(InMemoryStore::default()),
        legacy.path(),
        production.path(),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/storage-proxy/VENDORS/vendors/missing.png")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
    let body = test::read_body(resp).await;
    let text = String::from_utf8_lossy(&body);
    assert!(!text.contains(&legacy.path().display().to_string()));
    assert!(!text.contains(&production.path().display().to_string()));
    assert!(!text.contains("missing.png"));
}

/// (5) Encoded traversal never reaches the filesystem.
#[actix_rt::test]
async fn test_traversal_returns_404() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    write_file(production.path(), "secret.txt", b"secret");
    let app = create_test_app(
        Arc::new(InMemoryStore::default()),
        legacy.path(),
        production.path(),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/storage-proxy/VENDORS/vendors/%2E%2E%2F%2E%2E%2Fsecret.txt")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
}
