//! In-memory ledger and object store used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{MigrationRecord, MigrationStatus, NewMigrationRecord};
use crate::services::ledger::MigrationLedger;
use crate::services::storage::ObjectStore;

#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<MigrationRecord>>,
}

impl MemoryLedger {
    pub fn records(&self) -> Vec<MigrationRecord> {
        self.records.lock().unwrap().clone()
    }

    fn modify<F>(&self, id: Uuid, f: F) -> AppResult<MigrationRecord>
    where
        F: FnOnce(&mut MigrationRecord) -> AppResult<()>,
    {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Migration record {}", id)))?;
        f(record)?;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl MigrationLedger for MemoryLedger {
    async fn create_record(&self, record: NewMigrationRecord) -> AppResult<MigrationRecord> {
        let now = Utc::now();
        let created = MigrationRecord {
            id: Uuid::now_v7(),
            source_location: record.source_location,
            media_bucket: record.media_bucket,
            media_type: record.media_type,
            storage_key: record.storage_key,
            migration_status: MigrationStatus::Pending,
            verified: false,
            last_error: None,
            created_at: now,
            updated_at: now,
            migrated_at: None,
            verified_at: None,
        };
        self.records.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: MigrationStatus,
        error: Option<String>,
    ) -> AppResult<MigrationRecord> {
        self.modify(id, |record| {
            record.migration_status.check_transition(status)?;
            record.migration_status = status;
            match status {
                MigrationStatus::Migrated => {
                    record.migrated_at = Some(Utc::now());
                    record.last_error = None;
                }
                MigrationStatus::Failed => record.last_error = error,
                MigrationStatus::Pending => {}
            }
            Ok(())
        })
    }

    async fn mark_verified(&self, id: Uuid) -> AppResult<MigrationRecord> {
        self.modify(id, |record| {
            if !record.is_migrated() {
                return Err(AppError::InvalidInput("not migrated".to_string()));
            }
            record.verified = true;
            record.verified_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn find_by_source(&self, source_location: &str) -> AppResult<Vec<MigrationRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.source_location == source_location)
            .cloned()
            .collect())
    }

    async fn list_unverified(&self) -> AppResult<Vec<MigrationRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_migrated() && !r.verified)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), (Vec<u8>, Option<String>)>>,
    /// Keys whose uploads fail until removed
    pub failing_keys: Mutex<HashSet<String>>,
    puts: Mutex<usize>,
}

impl MemoryObjectStore {
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (data.to_vec(), None),
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(data, _)| data.clone())
    }

    pub fn put_count(&self) -> usize {
        *self.puts.lock().unwrap()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> AppResult<()> {
        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(AppError::Storage(format!("connection reset uploading {}", key)));
        }
        *self.puts.lock().unwrap() += 1;
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (data, content_type.map(String::from)),
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> AppResult<(Vec<u8>, Option<String>)> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Object {}/{}", bucket, key)))
    }

    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }
}
