//! Migration ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::migration_record;
use crate::error::{AppError, AppResult};

/// Migration status of a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Pending,
    Migrated,
    Failed,
}

impl MigrationStatus {
    /// Get status as string (matches the database CHECK constraint).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Migrated => "migrated",
            Self::Failed => "failed",
        }
    }

    /// Parse status from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "migrated" => Some(Self::Migrated),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Ledger state machine: `pending -> migrated`, `pending -> failed`,
    /// `failed -> pending` (retry). Nothing else.
    pub fn can_transition_to(&self, next: MigrationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Migrated)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    /// Validate a transition, returning an error naming both states.
    pub fn check_transition(&self, next: MigrationStatus) -> AppResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidInput(format!(
                "Illegal migration transition {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry for one physical source file.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MigrationRecord {
    pub id: Uuid,
    /// Source file path relative to the production root
    pub source_location: String,
    /// Target bucket
    pub media_bucket: String,
    /// MIME type inferred from the file extension
    pub media_type: String,
    /// Object key inside the bucket
    pub storage_key: String,
    pub migration_status: MigrationStatus,
    pub verified: bool,
    /// Error from the last failed upload, if any
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub migrated_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl MigrationRecord {
    /// Whether the record is already settled and needs no further upload.
    pub fn is_migrated(&self) -> bool {
        self.migration_status == MigrationStatus::Migrated
    }
}

impl TryFrom<migration_record::Model> for MigrationRecord {
    type Error = AppError;

    fn try_from(model: migration_record::Model) -> Result<Self, Self::Error> {
        let migration_status = MigrationStatus::parse(&model.migration_status).ok_or_else(|| {
            AppError::Database(format!(
                "Unknown migration status '{}' on record {}",
                model.migration_status, model.id
            ))
        })?;

        Ok(Self {
            id: model.id,
            source_location: model.source_location,
            media_bucket: model.media_bucket,
            media_type: model.media_type,
            storage_key: model.storage_key,
            migration_status,
            verified: model.verified,
            last_error: model.last_error,
            created_at: model.created_at,
            updated_at: model.updated_at,
            migrated_at: model.migrated_at,
            verified_at: model.verified_at,
        })
    }
}

/// Fields needed to open a ledger entry for a newly discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMigrationRecord {
    pub source_location: String,
    pub media_bucket: String,
    pub media_type: String,
    pub storage_key: String,
}
