//! Directory mirroring between the legacy and production media roots.
//!
//! Mirroring is additive: files missing on one side are copied over, nothing
//! is ever deleted. Files present on both sides are compared by SHA-256;
//! when the contents differ the copy with the newer modification time wins
//! and the pair is reported as a conflict.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{AppError, AppResult};
use crate::services::category::CategoryRegistry;

/// Suffix of in-flight copies; such files are ignored when listing.
const PARTIAL_SUFFIX: &str = ".mirror-partial";

/// Outcome of mirroring one directory pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub copied_a_to_b: usize,
    pub copied_b_to_a: usize,
    /// Relative paths whose contents differed between the two sides
    pub conflicts: Vec<String>,
    /// Files that could not be hashed or copied
    pub failed: usize,
}

/// Mirror outcome for one registry category.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryMirrorReport {
    pub category: String,
    pub report: Option<MirrorReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct FileEntry {
    pub(crate) path: PathBuf,
    pub(crate) modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    AToB,
    BToA,
}

/// Make `dir_a` and `dir_b` hold the same set of files.
///
/// Both directories are created if absent. A failure on one file is logged
/// and counted and the remaining files are still processed.
pub async fn mirror(dir_a: &Path, dir_b: &Path) -> AppResult<MirrorReport> {
    for dir in [dir_a, dir_b] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::FileSystem(format!("Failed to create {}: {}", dir.display(), e))
        })?;
    }

    let a_files = list_files(dir_a).await?;
    let b_files = list_files(dir_b).await?;

    let mut report = MirrorReport::default();
    let mut plan: Vec<(Direction, &PathBuf, &FileEntry)> = Vec::new();

    for (rel, a_entry) in &a_files {
        let Some(b_entry) = b_files.get(rel) else {
            plan.push((Direction::AToB, rel, a_entry));
            continue;
        };

        let (hash_a, hash_b) = match (hash_file(&a_entry.path).await, hash_file(&b_entry.path).await)
        {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                warn!(target: "media", file = %rel.display(), error = %e, "Failed to hash file, skipping");
                report.failed += 1;
                continue;
            }
        };
        if hash_a == hash_b {
            continue;
        }

        report.conflicts.push(rel.to_string_lossy().into_owned());
        match (a_entry.modified, b_entry.modified) {
            (Some(a_time), Some(b_time)) if a_time > b_time => {
                plan.push((Direction::AToB, rel, a_entry))
            }
            (Some(a_time), Some(b_time)) if b_time > a_time => {
                plan.push((Direction::BToA, rel, b_entry))
            }
            _ => {
                warn!(
                    target: "media",
                    file = %rel.display(),
                    "Diverged copies with indistinguishable modification times, leaving both"
                );
                continue;
            }
        }
        warn!(target: "media", file = %rel.display(), "Diverged copies, newer one propagated");
    }

    for (rel, b_entry) in &b_files {
        if !a_files.contains_key(rel) {
            plan.push((Direction::BToA, rel, b_entry));
        }
    }

    for (direction, rel, source) in plan {
        let target_root = match direction {
            Direction::AToB => dir_b,
            Direction::BToA => dir_a,
        };
        let target = target_root.join(rel);
        match copy_file(&source.path, &target, source.modified).await {
            Ok(()) => {
                debug!(target: "media", from = %source.path.display(), to = %target.display(), "Mirrored file");
                match direction {
                    Direction::AToB => report.copied_a_to_b += 1,
                    Direction::BToA => report.copied_b_to_a += 1,
                }
            }
            Err(e) => {
                warn!(target: "media", file = %rel.display(), error = %e, "Failed to mirror file, continuing");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Mirror every registry category between the two roots.
///
/// `{legacy_root}/{directory}` is paired with `{production_root}/{directory}`.
pub async fn mirror_categories(
    legacy_root: &Path,
    production_root: &Path,
    registry: &CategoryRegistry,
) -> Vec<CategoryMirrorReport> {
    let mut reports = Vec::with_capacity(registry.all().len());

    for category in registry.all() {
        let legacy = legacy_root.join(category.directory);
        let production = production_root.join(category.directory);

        match mirror(&legacy, &production).await {
            Ok(report) => {
                info!(
                    target: "media",
                    category = category.name,
                    legacy_to_production = report.copied_a_to_b,
                    production_to_legacy = report.copied_b_to_a,
                    conflicts = report.conflicts.len(),
                    failed = report.failed,
                    "Category mirrored"
                );
                reports.push(CategoryMirrorReport {
                    category: category.name.to_string(),
                    report: Some(report),
                    error: None,
                });
            }
            Err(e) => {
                error!(target: "media", category = category.name, error = %e, "Category mirror failed");
                reports.push(CategoryMirrorReport {
                    category: category.name.to_string(),
                    report: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    reports
}

/// List regular files under `root`, keyed by path relative to `root`.
pub(crate) async fn list_files(root: &Path) -> AppResult<BTreeMap<PathBuf, FileEntry>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(target: "media", root = %root.display(), error = %e, "Unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file()
                || entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX)
            {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            files.insert(
                rel.to_path_buf(),
                FileEntry {
                    path: entry.path().to_path_buf(),
                    modified,
                },
            );
        }
        files
    })
    .await
    .map_err(|e| AppError::FileSystem(format!("Directory scan task failed: {}", e)))
}

/// SHA-256 of a file's contents, hex encoded.
pub async fn hash_file(path: &Path) -> AppResult<String> {
    let data = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&data)))
}

/// Copy through a partial file and rename so readers never see a torn copy.
async fn copy_file(source: &Path, target: &Path, modified: Option<SystemTime>) -> AppResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::FileSystem(format!("Invalid target {}", target.display())))?;
    let partial = target.with_file_name(format!("{}{}", file_name, PARTIAL_SUFFIX));

    if let Err(e) = tokio::fs::copy(source, &partial).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    tokio::fs::rename(&partial, target).await?;

    if let Some(modified) = modified {
        let file = tokio::fs::OpenOptions::new().write(true).open(target).await?;
        if let Err(e) = file.into_std().await.set_modified(modified) {
            debug!(target: "media", file = %target.display(), error = %e, "Could not preserve mtime");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn set_age(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    async fn test_mirror_makes_union_present_on_both_sides() {
        let root = tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        write(&a.join("one.jpg"), b"one");
        write(&a.join("nested/two.png"), b"two");
        write(&b.join("three.gif"), b"three");

        let report = mirror(&a, &b).await.unwrap();
        assert_eq!(report.copied_a_to_b, 2);
        assert_eq!(report.copied_b_to_a, 1);
        assert!(report.conflicts.is_empty());
        assert_eq!(report.failed, 0);

        for rel in ["one.jpg", "nested/two.png", "three.gif"] {
            assert_eq!(
                std::fs::read(a.join(rel)).unwrap(),
                std::fs::read(b.join(rel)).unwrap(),
                "{} differs",
                rel
            );
        }
    }

    #[tokio::test]
    async fn test_mirror_is_stable_on_second_run() {
        let root = tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        write(&a.join("one.jpg"), b"one");

        mirror(&a, &b).await.unwrap();
        let second = mirror(&a, &b).await.unwrap();
        assert_eq!(second, MirrorReport::default());
    }

    #[tokio::test]
    async fn test_mirror_creates_missing_directories() {
        let root = tempdir().unwrap();
        let a = root.path().join("missing/a");
        let b = root.path().join("missing/b");

        let report = mirror(&a, &b).await.unwrap();
        assert_eq!(report, MirrorReport::default());
        assert!(a.is_dir());
        assert!(b.is_dir());
    }

    #[tokio::test]
    async fn test_diverged_files_newer_copy_wins_and_is_reported() {
        let root = tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        write(&a.join("same.jpg"), b"old contents");
        write(&b.join("same.jpg"), b"new contents");
        set_age(&a.join("same.jpg"), Duration::from_secs(3600));

        let report = mirror(&a, &b).await.unwrap();
        assert_eq!(report.conflicts, vec!["same.jpg".to_string()]);
        assert_eq!(report.copied_b_to_a, 1);
        assert_eq!(report.copied_a_to_b, 0);
        assert_eq!(std::fs::read(a.join("same.jpg")).unwrap(), b"new contents");
    }

    #[tokio::test]
    async fn test_identical_files_are_not_copied() {
        let root = tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        write(&a.join("same.jpg"), b"bytes");
        write(&b.join("same.jpg"), b"bytes");
        set_age(&a.join("same.jpg"), Duration::from_secs(3600));

        let report = mirror(&a, &b).await.unwrap();
        assert_eq!(report, MirrorReport::default());
    }

    #[tokio::test]
    async fn test_mirror_categories_copies_legacy_banner_into_production() {
        let site = tempdir().unwrap();
        let legacy = site.path().join("uploads");
        let production = site.path().to_path_buf();
        write(&legacy.join("banner-slides/x.jpg"), b"banner bytes");

        let reports = mirror_categories(&legacy, &production, &CategoryRegistry::builtin()).await;

        assert_eq!(reports.len(), CategoryRegistry::builtin().all().len());
        assert!(reports.iter().all(|r| r.error.is_none()));
        let banner = reports
            .iter()
            .find(|r| r.category == "banner-slides")
            .and_then(|r| r.report.clone())
            .unwrap();
        assert_eq!(banner.copied_a_to_b, 1);
        assert_eq!(
            std::fs::read(production.join("banner-slides/x.jpg")).unwrap(),
            b"banner bytes"
        );
        assert!(production.join("calendar").is_dir());
    }

    #[tokio::test]
    async fn test_mirror_categories_reports_unusable_root() {
        let site = tempdir().unwrap();
        let legacy = site.path().join("uploads");
        // A plain file where the production root should be
        let production = site.path().join("media");
        write(&production, b"not a directory");

        let reports = mirror_categories(&legacy, &production, &CategoryRegistry::builtin()).await;

        assert_eq!(reports.len(), CategoryRegistry::builtin().all().len());
        assert!(reports.iter().all(|r| r.report.is_none() && r.error.is_some()));
    }
}
