//! Database reference rewriter.
//!
//! Walks the media-reference columns of the content tables and rewrites
//! every stored reference through the [`Normalizer`]. Each changed row is
//! written with its own UPDATE; there is no transaction around a table or
//! a run, so an interrupted run leaves earlier rows rewritten and later rows
//! untouched. Re-running converges because normalization is idempotent.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use crate::error::AppResult;
use crate::services::normalizer::Normalizer;

/// Storage shape of a media-reference column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// A single text reference
    Scalar,
    /// A JSON array of references
    JsonArray,
}

/// A content-table column holding media references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub kind: ColumnKind,
    /// Category hint passed to the normalizer as context
    pub category: Option<&'static str>,
}

/// Media-reference columns of the community site schema.
pub const CONTENT_COLUMNS: &[ContentColumn] = &[
    ContentColumn {
        table: "events",
        column: "image_url",
        kind: ColumnKind::Scalar,
        category: Some("calendar"),
    },
    ContentColumn {
        table: "events",
        column: "media_urls",
        kind: ColumnKind::JsonArray,
        category: Some("calendar"),
    },
    ContentColumn {
        table: "forum_posts",
        column: "media_urls",
        kind: ColumnKind::JsonArray,
        category: Some("forum"),
    },
    ContentColumn {
        table: "forum_comments",
        column: "media_urls",
        kind: ColumnKind::JsonArray,
        category: Some("forum"),
    },
    ContentColumn {
        table: "page_contents",
        column: "media_urls",
        kind: ColumnKind::JsonArray,
        category: Some("community"),
    },
    ContentColumn {
        table: "real_estate_listings",
        column: "photos",
        kind: ColumnKind::JsonArray,
        category: Some("real-estate"),
    },
    ContentColumn {
        table: "users",
        column: "avatar_url",
        kind: ColumnKind::Scalar,
        category: Some("avatars"),
    },
];

/// Current value of a reference column on one row.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceValue {
    Scalar(String),
    List(Vec<JsonValue>),
}

/// One row of a reference column.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    /// Primary key rendered as text
    pub id: String,
    pub value: ReferenceValue,
}

/// Read/write access to media-reference columns.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Rows whose column is non-null (and, for arrays, non-empty).
    async fn fetch_references(&self, column: &ContentColumn) -> AppResult<Vec<ReferenceRow>>;

    /// Overwrite the column on a single row.
    async fn store_reference(
        &self,
        column: &ContentColumn,
        id: &str,
        value: &ReferenceValue,
    ) -> AppResult<()>;
}

/// Tuning for a rewrite run.
#[derive(Debug, Clone, Copy)]
pub struct RewriteOptions {
    /// Rows whose updates are awaited together
    pub batch_size: usize,
    /// Count changes without writing them
    pub dry_run: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            dry_run: false,
        }
    }
}

/// Outcome of rewriting one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    pub table: String,
    pub column: String,
    pub records_scanned: usize,
    pub records_updated: usize,
    pub records_failed: usize,
    /// References still in a local-path shape after rewriting
    pub unresolved: usize,
    /// Set when the column could not be read at all
    pub scan_error: Option<String>,
}

/// Normalize a column value, returning the new value only if it changed.
///
/// Non-string array elements are passed through untouched.
pub fn rewrite_value(
    normalizer: &Normalizer,
    value: &ReferenceValue,
    context: Option<&str>,
) -> Option<ReferenceValue> {
    match value {
        ReferenceValue::Scalar(current) => {
            let normalized = normalizer.normalize(current, context);
            (normalized != *current).then_some(ReferenceValue::Scalar(normalized))
        }
        ReferenceValue::List(items) => {
            let mut changed = false;
            let rewritten: Vec<JsonValue> = items
                .iter()
                .map(|item| match item {
                    JsonValue::String(current) => {
                        let normalized = normalizer.normalize(current, context);
                        if normalized != *current {
                            changed = true;
                        }
                        JsonValue::String(normalized)
                    }
                    other => other.clone(),
                })
                .collect();
            changed.then_some(ReferenceValue::List(rewritten))
        }
    }
}

/// Count references in `value` the normalizer could not map off a local path.
pub fn unresolved_references(normalizer: &Normalizer, value: &ReferenceValue) -> usize {
    let strings: Vec<&str> = match value {
        ReferenceValue::Scalar(current) => vec![current.as_str()],
        ReferenceValue::List(items) => items.iter().filter_map(JsonValue::as_str).collect(),
    };
    strings
        .into_iter()
        .filter(|reference| {
            let shape = normalizer.classify(reference);
            if shape.is_local_path() {
                debug!(target: "media", reference = %reference, shape = ?shape, "Reference left unresolved");
            }
            shape.is_local_path()
        })
        .count()
}

/// Rewrite every reference in one column.
///
/// A failed row update is logged and counted; the scan continues. Only a
/// failure to read the column at all is returned as an error.
pub async fn rewrite_column<S>(
    store: &S,
    normalizer: &Normalizer,
    column: &ContentColumn,
    options: RewriteOptions,
) -> AppResult<RewriteReport>
where
    S: ReferenceStore + ?Sized,
{
    let rows = store.fetch_references(column).await?;

    let mut report = RewriteReport {
        table: column.table.to_string(),
        column: column.column.to_string(),
        records_scanned: rows.len(),
        ..Default::default()
    };

    for chunk in rows.chunks(options.batch_size.max(1)) {
        let mut changes: Vec<(&ReferenceRow, ReferenceValue)> = Vec::new();
        for row in chunk {
            let rewritten = rewrite_value(normalizer, &row.value, column.category);
            report.unresolved +=
                unresolved_references(normalizer, rewritten.as_ref().unwrap_or(&row.value));
            if let Some(new) = rewritten {
                changes.push((row, new));
            }
        }

        if options.dry_run {
            report.records_updated += changes.len();
            continue;
        }

        let results = join_all(changes.iter().map(|(row, new)| async move {
            let outcome = store.store_reference(column, &row.id, new).await;
            (row.id.as_str(), outcome)
        }))
        .await;

        for (id, outcome) in results {
            match outcome {
                Ok(()) => report.records_updated += 1,
                Err(e) => {
                    warn!(
                        target: "media",
                        table = column.table,
                        column = column.column,
                        id = %id,
                        error = %e,
                        "Failed to rewrite row, continuing"
                    );
                    report.records_failed += 1;
                }
            }
        }
    }

    info!(
        target: "media",
        table = column.table,
        column = column.column,
        scanned = report.records_scanned,
        updated = report.records_updated,
        failed = report.records_failed,
        unresolved = report.unresolved,
        dry_run = options.dry_run,
        "Column rewrite finished"
    );

    Ok(report)
}

/// Rewrite every registered content column.
///
/// A column that cannot be read is logged and reported with its
/// `scan_error` set; the remaining columns are still rewritten.
pub async fn rewrite_all<S>(
    store: &S,
    normalizer: &Normalizer,
    columns: &[ContentColumn],
    options: RewriteOptions,
) -> Vec<RewriteReport>
where
    S: ReferenceStore + ?Sized,
{
    let mut reports = Vec::with_capacity(columns.len());
    for column in columns {
        match rewrite_column(store, normalizer, column, options).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(
                    target: "media",
                    table = column.table,
                    column = column.column,
                    error = %e,
                    "Skipping column that could not be scanned"
                );
                reports.push(RewriteReport {
                    table: column.table.to_string(),
                    column: column.column.to_string(),
                    scan_error: Some(e.to_string()),
                    ..Default::default()
                });
            }
        }
    }
    reports
}
