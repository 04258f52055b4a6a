//! E2E tests: mirroring followed by migration and proxy delivery.

use std::sync::Arc;

use actix_web::test;
use community_media_lib::services::CategoryRegistry;
use community_media_lib::services::migration::discover_files;
use community_media_lib::services::mirror::{hash_file, mirror_categories};
use tempfile::tempdir;

use super::test_helpers::*;

/// (1) A banner only under the legacy root is byte-identical under the
/// production root after mirroring, and is then served from there.
#[actix_rt::test]
async fn test_legacy_banner_mirrored_and_served() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    write_file(legacy.path(), "banner-slides/x.jpg", b"banner-x");

    let reports = mirror_categories(legacy.path(), production.path(), &CategoryRegistry::builtin()).await;
    let banner = reports
        .iter()
        .find(|r| r.category == "banner-slides")
        .and_then(|r| r.report.as_ref())
        .unwrap();
    assert_eq!(banner.copied_a_to_b, 1);

    let legacy_file = legacy.path().join("banner-slides/x.jpg");
    let production_file = production.path().join("banner-slides/x.jpg");
    assert_eq!(
        hash_file(&legacy_file).await.unwrap(),
        hash_file(&production_file).await.unwrap()
    );

    // Drop the legacy copy so the response must come from the production root
    std::fs::remove_file(&legacy_file).unwrap();

    let app = create_test_app(
        Arc::new(InMemoryStore::default()),
        legacy.path(),
        production.path(),
    )
    .await;
    let req = test::TestRequest::get()
        .uri("/api/storage-proxy/BANNER/banner-slides/x.jpg")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-media-source").unwrap(), "category-root");
}

/// (2) Mirrored files are discovered for migration under their bucket.
#[actix_rt::test]
async fn test_mirrored_files_are_discovered() {
    let legacy = tempdir().unwrap();
    let production = tempdir().unwrap();
    write_file(legacy.path(), "real-estate/house.jpg", b"house");
    write_file(production.path(), "avatars/u1.png", b"u1");

    let registry = CategoryRegistry::builtin();
    mirror_categories(legacy.path(), production.path(), &registry).await;

    let discovery = discover_files(production.path(), &registry).await.unwrap();
    assert!(discovery.collisions.is_empty());
    let mut keys: Vec<(String, String)> = discovery
        .files
        .into_iter()
        .map(|f| (f.bucket, f.storage_key))
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            ("PROFILES".to_string(), "avatars/u1.png".to_string()),
            ("REAL_ESTATE".to_string(), "real-estate/house.jpg".to_string()),
        ]
    );
}
