//! Database queries for the media migration ledger.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::entity::migration_record::{self, ActiveModel, Entity as MigrationRecordEntity};
use crate::error::{AppError, AppResult};
use crate::models::{MigrationRecord, MigrationStatus, NewMigrationRecord};
use crate::services::ledger::MigrationLedger;

use super::DbPool;

impl DbPool {
    /// Insert a pending ledger record.
    pub async fn insert_migration_record(
        &self,
        record: NewMigrationRecord,
    ) -> AppResult<MigrationRecord> {
        let now = Utc::now();

        let model = ActiveModel {
            id: Set(Uuid::now_v7()),
            source_location: Set(record.source_location),
            media_bucket: Set(record.media_bucket),
            media_type: Set(record.media_type),
            storage_key: Set(record.storage_key),
            migration_status: Set(MigrationStatus::Pending.as_str().to_string()),
            verified: Set(false),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            migrated_at: Set(None),
            verified_at: Set(None),
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert migration record: {}", e)))?;

        MigrationRecord::try_from(result)
    }

    /// Get a ledger record by ID.
    pub async fn get_migration_record(&self, id: Uuid) -> AppResult<migration_record::Model> {
        MigrationRecordEntity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get migration record: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Migration record {}", id)))
    }

    /// Apply a status transition after checking it against the state machine.
    pub async fn transition_migration_record(
        &self,
        id: Uuid,
        status: MigrationStatus,
        error: Option<String>,
    ) -> AppResult<MigrationRecord> {
        let current = self.get_migration_record(id).await?;
        let current_status = MigrationStatus::parse(&current.migration_status).ok_or_else(|| {
            AppError::Database(format!(
                "Unknown migration status '{}' on record {}",
                current.migration_status, id
            ))
        })?;
        current_status.check_transition(status)?;

        let now = Utc::now();
        let mut active: ActiveModel = current.into();
        active.migration_status = Set(status.as_str().to_string());
        active.updated_at = Set(now);
        match status {
            MigrationStatus::Migrated => {
                active.migrated_at = Set(Some(now));
                active.last_error = Set(None);
            }
            MigrationStatus::Failed => {
                active.last_error = Set(error);
            }
            MigrationStatus::Pending => {}
        }

        let result = active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update migration record: {}", e)))?;

        MigrationRecord::try_from(result)
    }

    /// Set `verified` on a migrated record.
    pub async fn verify_migration_record(&self, id: Uuid) -> AppResult<MigrationRecord> {
        let current = self.get_migration_record(id).await?;
        if current.migration_status != MigrationStatus::Migrated.as_str() {
            return Err(AppError::InvalidInput(format!(
                "Cannot verify migration record {} in status {}",
                id, current.migration_status
            )));
        }

        let now = Utc::now();
        let mut active: ActiveModel = current.into();
        active.verified = Set(true);
        active.verified_at = Set(Some(now));
        active.updated_at = Set(now);

        let result = active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to verify migration record: {}", e)))?;

        MigrationRecord::try_from(result)
    }

    /// Get all ledger records for a source location.
    pub async fn get_migration_records_by_source(
        &self,
        source_location: &str,
    ) -> AppResult<Vec<MigrationRecord>> {
        MigrationRecordEntity::find()
            .filter(migration_record::Column::SourceLocation.eq(source_location))
            .order_by_asc(migration_record::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to find migration records: {}", e)))?
            .into_iter()
            .map(MigrationRecord::try_from)
            .collect()
    }

    /// Get migrated records still waiting for verification.
    pub async fn get_unverified_migration_records(&self) -> AppResult<Vec<MigrationRecord>> {
        MigrationRecordEntity::find()
            .filter(
                migration_record::Column::MigrationStatus.eq(MigrationStatus::Migrated.as_str()),
            )
            .filter(migration_record::Column::Verified.eq(false))
            .order_by_asc(migration_record::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to list unverified migration records: {}", e))
            })?
            .into_iter()
            .map(MigrationRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl MigrationLedger for DbPool {
    async fn create_record(&self, record: NewMigrationRecord) -> AppResult<MigrationRecord> {
        self.insert_migration_record(record).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: MigrationStatus,
        error: Option<String>,
    ) -> AppResult<MigrationRecord> {
        self.transition_migration_record(id, status, error).await
    }

    async fn mark_verified(&self, id: Uuid) -> AppResult<MigrationRecord> {
        self.verify_migration_record(id).await
    }

    async fn find_by_source(&self, source_location: &str) -> AppResult<Vec<MigrationRecord>> {
        self.get_migration_records_by_source(source_location).await
    }

    async fn list_unverified(&self) -> AppResult<Vec<MigrationRecord>> {
        self.get_unverified_migration_records().await
    }
}
