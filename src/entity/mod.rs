//! SeaORM entity definitions for PostgreSQL database.

pub mod migration_record;
