//! MigrationRecord entity for SeaORM.
//!
//! One row per physical source file moved to object storage. Rows are
//! never deleted; they are the audit trail and resume checkpoint of the
//! media migration job.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "migration_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub source_location: String,
    pub media_bucket: String,
    pub media_type: String,
    pub storage_key: String,
    pub migration_status: String,
    pub verified: bool,
    /// Error message from the last failed upload
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub migrated_at: Option<DateTimeUtc>,
    pub verified_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
