//! E2E tests: migration ledger on PostgreSQL.
//!
//! Requires a running PostgreSQL database reachable through DATABASE_URL.

use std::sync::OnceLock;

use community_media_lib::config::Config;
use community_media_lib::db::DbPool;
use community_media_lib::error::AppError;
use community_media_lib::models::{MigrationStatus, NewMigrationRecord};
use community_media_lib::services::MigrationLedger;
use uuid::Uuid;

static MIGRATIONS_RUN: OnceLock<()> = OnceLock::new();

/// Create a fresh DB pool. Migrations run only once.
async fn create_test_pool() -> DbPool {
    let mut config = Config::from_env()
        .expect("Failed to load config. Ensure RUST_ENV and DATABASE_URL are set.");
    config.database.max_connections = 2;
    config.database.min_connections = 1;

    let pool = DbPool::new(&config)
        .await
        .expect("Failed to connect to database");

    if MIGRATIONS_RUN.get().is_none() {
        pool.run_migrations()
            .await
            .expect("Failed to run migrations");
        let _ = MIGRATIONS_RUN.set(());
    }

    pool
}

fn new_record() -> NewMigrationRecord {
    let unique = Uuid::new_v4().simple().to_string();
    NewMigrationRecord {
        source_location: format!("calendar/e2e-{}.jpg", unique),
        media_bucket: "CALENDAR".to_string(),
        media_type: "image/jpeg".to_string(),
        storage_key: format!("events/e2e-{}.jpg", unique),
    }
}

/// (1) pending -> migrated -> verified.
#[actix_rt::test]
#[ignore = "requires PostgreSQL"]
async fn test_record_lifecycle() {
    let pool = create_test_pool().await;
    let created = pool.create_record(new_record()).await.unwrap();
    assert_eq!(created.migration_status, MigrationStatus::Pending);
    assert!(!created.verified);

    let migrated = pool
        .update_status(created.id, MigrationStatus::Migrated, None)
        .await
        .unwrap();
    assert!(migrated.migrated_at.is_some());

    let unverified = pool.list_unverified().await.unwrap();
    assert!(unverified.iter().any(|r| r.id == created.id));

    let verified = pool.mark_verified(created.id).await.unwrap();
    assert!(verified.verified);

    let found = pool.find_by_source(&created.source_location).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].verified);
}

/// (2) Illegal transitions are rejected.
#[actix_rt::test]
#[ignore = "requires PostgreSQL"]
async fn test_illegal_transitions_rejected() {
    let pool = create_test_pool().await;
    let created = pool.create_record(new_record()).await.unwrap();

    let err = pool.mark_verified(created.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    pool.update_status(created.id, MigrationStatus::Failed, Some("timeout".into()))
        .await
        .unwrap();
    let err = pool
        .update_status(created.id, MigrationStatus::Migrated, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let retried = pool
        .update_status(created.id, MigrationStatus::Pending, None)
        .await
        .unwrap();
    assert_eq!(retried.migration_status, MigrationStatus::Pending);
    assert_eq!(retried.last_error.as_deref(), Some("timeout"));
}
