//! E2E tests: legacy media URLs redirect to the storage proxy.

use std::sync::Arc;

use actix_web::http::header;
use actix_web::test;
use tempfile::tempdir;

use super::test_helpers::*;

/// (1) `/uploads/{dir}/{file}` redirects, and the target is servable.
#[actix_rt::test]
async fn test_uploads_path_redirects_to_servable_location() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    write_file(legacy.path(), "calendar/gala.webp", b"gala");
    let app = create_test_app(
        Arc::new(InMemoryStore::default()),
        legacy.path(),
        production.path(),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/uploads/calendar/gala.webp")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 301);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(location, "/api/storage-proxy/CALENDAR/events/gala.webp");

    let req = test::TestRequest::get().uri(&location).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"gala");
}

/// (2) Alias spellings converge on the same canonical location.
#[actix_rt::test]
async fn test_alias_spellings_converge() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    let app = create_test_app(
        Arc::new(InMemoryStore::default()),
        legacy.path(),
        production.path(),
    )
    .await;

    for uri in [
        "/events/a.jpg",
        "/calendar-events/a.jpg",
        "/uploads/event-media/a.jpg",
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 301, "{}", uri);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/api/storage-proxy/CALENDAR/events/a.jpg",
            "{}",
            uri
        );
    }
}
