//! Migration: Create migration_records table.
//!
//! Ledger of media files moved from local storage roots to object storage.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;

                CREATE TABLE migration_records (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting

                    -- Source and target
                    source_location TEXT NOT NULL,         -- path on disk at discovery time
                    media_bucket VARCHAR(100) NOT NULL,    -- target bucket
                    media_type VARCHAR(100) NOT NULL,      -- MIME type
                    storage_key VARCHAR(500) NOT NULL,     -- object key inside the bucket

                    -- Progress
                    migration_status VARCHAR(20) NOT NULL DEFAULT 'pending'
                        CHECK (migration_status IN ('pending', 'migrated', 'failed')),
                    verified BOOLEAN NOT NULL DEFAULT FALSE
                        CHECK (NOT verified OR migration_status = 'migrated'),
                    last_error TEXT,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    migrated_at TIMESTAMPTZ,
                    verified_at TIMESTAMPTZ
                );

                -- Resume lookups by source file
                CREATE INDEX idx_migration_records_source_location
                    ON migration_records(source_location);

                -- Verification pass scans migrated, unverified rows
                CREATE INDEX idx_migration_records_unverified
                    ON migration_records(migration_status)
                    WHERE verified = FALSE;

                CREATE INDEX idx_migration_records_bucket_key
                    ON migration_records(media_bucket, storage_key);

                CREATE TRIGGER update_migration_records_updated_at
                    BEFORE UPDATE ON migration_records
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_migration_records_updated_at ON migration_records;
                DROP TABLE IF EXISTS migration_records CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
