//! Migration ledger contract.
//!
//! The ledger makes the media migration job idempotent and resumable: one
//! record per source file, status advanced only along the
//! [`MigrationStatus`] state machine, never deleted.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{MigrationRecord, MigrationStatus, NewMigrationRecord};

/// Persistent per-file migration checkpoint.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    /// Open a `pending` record for a newly discovered file.
    async fn create_record(&self, record: NewMigrationRecord) -> AppResult<MigrationRecord>;

    /// Move a record along the state machine. Illegal transitions are
    /// rejected with `AppError::InvalidInput`. `error` is stored on
    /// `failed` and cleared otherwise.
    async fn update_status(
        &self,
        id: Uuid,
        status: MigrationStatus,
        error: Option<String>,
    ) -> AppResult<MigrationRecord>;

    /// Flag a migrated record as confirmed fetchable at its new location.
    async fn mark_verified(&self, id: Uuid) -> AppResult<MigrationRecord>;

    /// All records for a source file, oldest first.
    async fn find_by_source(&self, source_location: &str) -> AppResult<Vec<MigrationRecord>>;

    /// Migrated records that have not been verified yet.
    async fn list_unverified(&self) -> AppResult<Vec<MigrationRecord>>;
}
