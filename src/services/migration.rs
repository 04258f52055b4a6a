//! Filesystem-to-object-storage migration job.
//!
//! Files under the production root are discovered per registry category,
//! recorded in the [`MigrationLedger`], and uploaded in fixed-size batches.
//! The ledger makes the job resumable: migrated files are skipped, failed
//! files are retried, and a verification pass confirms uploaded objects can
//! be fetched before they are marked verified.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::AppResult;
use crate::models::{MigrationRecord, MigrationStatus, NewMigrationRecord};
use crate::services::category::CategoryRegistry;
use crate::services::ledger::MigrationLedger;
use crate::services::mirror::list_files;
use crate::services::storage::{ObjectStore, Storage};

/// What a job run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Upload pending and failed files, then verify
    Migrate,
    /// Only verify already migrated records
    VerifyOnly,
}

/// Tuning for a job run.
#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    /// Files whose uploads are awaited together
    pub batch_size: usize,
    pub mode: JobMode,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            mode: JobMode::Migrate,
        }
    }
}

/// A media file found under the production root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path to read the file from
    pub path: PathBuf,
    /// Stable ledger key: `{directory}/{relative path}` with forward slashes
    pub source_location: String,
    pub bucket: String,
    pub storage_key: String,
    pub media_type: String,
}

/// A file left out of the upload because its object key is already taken by
/// another file of a flat category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCollision {
    pub file: DiscoveredFile,
    /// Source location of the file that keeps the key
    pub kept_source: String,
}

impl KeyCollision {
    fn reason(&self) -> String {
        format!(
            "object key {}/{} already taken by {}",
            self.file.bucket, self.file.storage_key, self.kept_source
        )
    }
}

/// Files found under the production root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub collisions: Vec<KeyCollision>,
}

/// Totals for one job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub discovered: usize,
    pub uploaded: usize,
    /// Already migrated before this run
    pub skipped: usize,
    pub failed: usize,
    /// Previously failed records picked up again
    pub retried: usize,
    /// Files recorded as failed because another file maps to the same object
    pub collisions: usize,
    pub verified: usize,
    pub verify_failed: usize,
}

/// Result of processing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Uploaded { retried: bool },
    Skipped,
    Failed { retried: bool },
}

/// Find every media file under `production_root` for the registry categories.
///
/// Hidden files are ignored. Object keys keep the path below the category
/// directory, except for flat categories which key by filename. Two files of
/// a flat category sharing a filename keep the first in path order; the rest
/// are returned as collisions.
pub async fn discover_files(
    production_root: &Path,
    registry: &CategoryRegistry,
) -> AppResult<Discovery> {
    let mut discovery = Discovery::default();
    let mut seen: HashMap<(String, String), String> = HashMap::new();

    for category in registry.all() {
        let dir = production_root.join(category.directory);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            debug!(target: "media", category = category.name, dir = %dir.display(), "Category directory absent");
            continue;
        }

        for (rel, entry) in list_files(&dir).await? {
            if rel
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
            {
                continue;
            }
            let Some(filename) = rel.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };

            let rel_display = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let source_location = format!("{}/{}", category.directory, rel_display);
            let storage_key = category.object_key(&rel_display);

            let file = DiscoveredFile {
                path: entry.path,
                source_location,
                bucket: category.bucket.to_string(),
                media_type: Storage::content_type_for_path(&filename).to_string(),
                storage_key,
            };

            match seen.entry((file.bucket.clone(), file.storage_key.clone())) {
                Entry::Occupied(kept) => {
                    warn!(
                        target: "media",
                        source = %file.source_location,
                        kept = %kept.get(),
                        bucket = %file.bucket,
                        key = %file.storage_key,
                        "Another file already maps to this object, recording as failed"
                    );
                    discovery.collisions.push(KeyCollision {
                        kept_source: kept.get().clone(),
                        file,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(file.source_location.clone());
                    discovery.files.push(file);
                }
            }
        }
    }

    Ok(discovery)
}

/// Record a colliding file as failed so it shows up in the ledger.
///
/// Records already failed or migrated are left alone.
pub async fn record_collision<L>(ledger: &L, collision: &KeyCollision) -> AppResult<()>
where
    L: MigrationLedger + ?Sized,
{
    let file = &collision.file;
    let existing = ledger.find_by_source(&file.source_location).await?;

    let record = match existing.into_iter().next() {
        Some(record) if record.migration_status != MigrationStatus::Pending => return Ok(()),
        Some(record) => record,
        None => {
            ledger
                .create_record(NewMigrationRecord {
                    source_location: file.source_location.clone(),
                    media_bucket: file.bucket.clone(),
                    media_type: file.media_type.clone(),
                    storage_key: file.storage_key.clone(),
                })
                .await?
        }
    };

    ledger
        .update_status(record.id, MigrationStatus::Failed, Some(collision.reason()))
        .await?;
    Ok(())
}

/// Bring the ledger record for `file` to `pending`, creating it if needed.
///
/// Returns `None` when the file is already migrated.
async fn claim_record<L>(ledger: &L, file: &DiscoveredFile) -> AppResult<Option<(MigrationRecord, bool)>>
where
    L: MigrationLedger + ?Sized,
{
    let existing = ledger.find_by_source(&file.source_location).await?;

    if existing.iter().any(|r| r.is_migrated()) {
        return Ok(None);
    }

    match existing.into_iter().next() {
        Some(record) if record.migration_status == MigrationStatus::Failed => {
            let record = ledger
                .update_status(record.id, MigrationStatus::Pending, None)
                .await?;
            Ok(Some((record, true)))
        }
        Some(record) => Ok(Some((record, false))),
        None => {
            let record = ledger
                .create_record(NewMigrationRecord {
                    source_location: file.source_location.clone(),
                    media_bucket: file.bucket.clone(),
                    media_type: file.media_type.clone(),
                    storage_key: file.storage_key.clone(),
                })
                .await?;
            Ok(Some((record, false)))
        }
    }
}

async fn upload_file<S>(store: &S, record: &MigrationRecord, path: &Path) -> AppResult<()>
where
    S: ObjectStore + ?Sized,
{
    let data = tokio::fs::read(path).await?;
    store
        .put(
            &record.media_bucket,
            &record.storage_key,
            data,
            Some(&record.media_type),
        )
        .await
}

async fn process_file<L, S>(ledger: &L, store: &S, file: &DiscoveredFile) -> AppResult<FileOutcome>
where
    L: MigrationLedger + ?Sized,
    S: ObjectStore + ?Sized,
{
    let Some((record, retried)) = claim_record(ledger, file).await? else {
        return Ok(FileOutcome::Skipped);
    };

    match upload_file(store, &record, &file.path).await {
        Ok(()) => {
            ledger
                .update_status(record.id, MigrationStatus::Migrated, None)
                .await?;
            debug!(
                target: "media",
                source = %file.source_location,
                bucket = %record.media_bucket,
                key = %record.storage_key,
                "File migrated"
            );
            Ok(FileOutcome::Uploaded { retried })
        }
        Err(e) => {
            warn!(target: "media", source = %file.source_location, error = %e, "Upload failed, will retry next run");
            ledger
                .update_status(record.id, MigrationStatus::Failed, Some(e.to_string()))
                .await?;
            Ok(FileOutcome::Failed { retried })
        }
    }
}

/// Upload discovered files and record outcomes in the ledger.
///
/// A ledger error on one file is logged and counted as a failure; the rest
/// of the batch continues.
pub async fn migrate_files<L, S>(
    ledger: &L,
    store: &S,
    files: &[DiscoveredFile],
    batch_size: usize,
    report: &mut JobReport,
) where
    L: MigrationLedger + ?Sized,
    S: ObjectStore + ?Sized,
{
    for chunk in files.chunks(batch_size.max(1)) {
        let outcomes = join_all(chunk.iter().map(|file| async move {
            (file, process_file(ledger, store, file).await)
        }))
        .await;

        for (file, outcome) in outcomes {
            match outcome {
                Ok(FileOutcome::Uploaded { retried }) => {
                    report.uploaded += 1;
                    report.retried += usize::from(retried);
                }
                Ok(FileOutcome::Skipped) => report.skipped += 1,
                Ok(FileOutcome::Failed { retried }) => {
                    report.failed += 1;
                    report.retried += usize::from(retried);
                }
                Err(e) => {
                    error!(target: "media", source = %file.source_location, error = %e, "Ledger update failed");
                    report.failed += 1;
                }
            }
        }
    }
}

/// Confirm migrated objects are fetchable and mark them verified.
pub async fn verify_pass<L, S>(
    ledger: &L,
    store: &S,
    batch_size: usize,
    report: &mut JobReport,
) -> AppResult<()>
where
    L: MigrationLedger + ?Sized,
    S: ObjectStore + ?Sized,
{
    let pending = ledger.list_unverified().await?;

    for chunk in pending.chunks(batch_size.max(1)) {
        let results = join_all(chunk.iter().map(|record| async move {
            let outcome = match store.exists(&record.media_bucket, &record.storage_key).await {
                Ok(true) => ledger.mark_verified(record.id).await.map(|_| true),
                Ok(false) => Ok(false),
                Err(e) => Err(e),
            };
            (record, outcome)
        }))
        .await;

        for (record, outcome) in results {
            match outcome {
                Ok(true) => report.verified += 1,
                Ok(false) => {
                    warn!(
                        target: "media",
                        source = %record.source_location,
                        bucket = %record.media_bucket,
                        key = %record.storage_key,
                        "Migrated object is missing from storage"
                    );
                    report.verify_failed += 1;
                }
                Err(e) => {
                    warn!(target: "media", source = %record.source_location, error = %e, "Verification failed");
                    report.verify_failed += 1;
                }
            }
        }
    }

    Ok(())
}

/// Run the migration job over `production_root`.
pub async fn run_migration<L, S>(
    ledger: &L,
    store: &S,
    production_root: &Path,
    registry: &CategoryRegistry,
    options: JobOptions,
) -> AppResult<JobReport>
where
    L: MigrationLedger + ?Sized,
    S: ObjectStore + ?Sized,
{
    let mut report = JobReport::default();

    if options.mode == JobMode::Migrate {
        let discovery = discover_files(production_root, registry).await?;
        report.discovered = discovery.files.len();
        report.collisions = discovery.collisions.len();
        info!(
            target: "media",
            root = %production_root.display(),
            discovered = report.discovered,
            collisions = report.collisions,
            "Discovered media files"
        );
        for collision in &discovery.collisions {
            if let Err(e) = record_collision(ledger, collision).await {
                error!(target: "media", source = %collision.file.source_location, error = %e, "Ledger update failed");
            }
        }
        migrate_files(ledger, store, &discovery.files, options.batch_size, &mut report).await;
    }

    verify_pass(ledger, store, options.batch_size, &mut report).await?;

    info!(
        target: "media",
        uploaded = report.uploaded,
        skipped = report.skipped,
        failed = report.failed,
        retried = report.retried,
        verified = report.verified,
        verify_failed = report.verify_failed,
        "Migration job finished"
    );

    Ok(report)
}
