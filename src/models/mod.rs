//! Domain models for media migration.

pub mod migration_record;

pub use migration_record::{MigrationRecord, MigrationStatus, NewMigrationRecord};
