//! Media resolution for the storage proxy.
//!
//! A canonical `{bucket}/{key}` is looked up in object storage first. While
//! legacy rows and files are still being migrated, misses fall back through
//! the local legacy directory, alternate object keys the bucket has used
//! historically, and the production category directory.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::services::category::CategoryRegistry;
use crate::services::normalizer::LEGACY_UPLOADS_SEGMENT;
use crate::services::storage::ObjectStore;

/// Which probe produced a hit. Reported in the `X-Media-Source` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Canonical,
    LegacyLocal,
    AlternateKey,
    CategoryRoot,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::Canonical => "canonical",
            MediaSource::LegacyLocal => "legacy-local",
            MediaSource::AlternateKey => "alternate-key",
            MediaSource::CategoryRoot => "category-root",
        }
    }
}

/// One location to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Object { bucket: String, key: String },
    Local(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub source: MediaSource,
    pub target: ProbeTarget,
}

/// A located media file.
#[derive(Debug)]
pub enum ResolvedMedia {
    Local {
        path: PathBuf,
        source: MediaSource,
    },
    Object {
        data: Vec<u8>,
        content_type: Option<String>,
        source: MediaSource,
    },
}

impl ResolvedMedia {
    pub fn source(&self) -> MediaSource {
        match self {
            ResolvedMedia::Local { source, .. } | ResolvedMedia::Object { source, .. } => *source,
        }
    }
}

/// Reject anything but plain relative segments.
fn is_safe_relative(value: &str) -> bool {
    if value.is_empty() || value.contains('\\') || value.contains('\0') {
        return false;
    }
    Path::new(value)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

pub struct MediaResolver {
    store: Arc<dyn ObjectStore>,
    registry: CategoryRegistry,
    legacy_root: PathBuf,
    production_root: PathBuf,
}

impl MediaResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: CategoryRegistry,
        legacy_root: PathBuf,
        production_root: PathBuf,
    ) -> Self {
        Self {
            store,
            registry,
            legacy_root,
            production_root,
        }
    }

    /// Locations to try for `{bucket}/{key}`, in probe order.
    ///
    /// Returns an invalid-input error for bucket or key values that could
    /// escape a media directory.
    pub fn candidates(&self, bucket: &str, key: &str) -> AppResult<Vec<Probe>> {
        if !is_safe_relative(bucket) || bucket.contains('/') || !is_safe_relative(key) {
            return Err(AppError::InvalidInput(format!(
                "Unsafe media path {}/{}",
                bucket, key
            )));
        }

        let mut probes = vec![Probe {
            source: MediaSource::Canonical,
            target: ProbeTarget::Object {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
        }];

        let Some(category) = self.registry.by_bucket(bucket) else {
            return Ok(probes);
        };
        // Path below the category directory; the filename for flat categories.
        let relative = category.relative_path(key);

        probes.push(Probe {
            source: MediaSource::LegacyLocal,
            target: ProbeTarget::Local(self.legacy_root.join(category.directory).join(relative)),
        });

        let alternates = [
            format!("{}/{}", category.directory, relative),
            relative.to_string(),
            format!("{}/{}/{}", LEGACY_UPLOADS_SEGMENT, category.directory, relative),
        ];
        for alternate in alternates {
            let duplicate = probes.iter().any(|p| {
                matches!(&p.target, ProbeTarget::Object { key, .. } if *key == alternate)
            });
            if !duplicate {
                probes.push(Probe {
                    source: MediaSource::AlternateKey,
                    target: ProbeTarget::Object {
                        bucket: category.bucket.to_string(),
                        key: alternate,
                    },
                });
            }
        }

        probes.push(Probe {
            source: MediaSource::CategoryRoot,
            target: ProbeTarget::Local(
                self.production_root.join(category.directory).join(relative),
            ),
        });

        Ok(probes)
    }

    /// Find the first probe that hits.
    ///
    /// Storage errors on one probe are logged and the next probe is tried.
    /// Returns `AppError::NotFound` when nothing matches.
    pub async fn resolve(&self, bucket: &str, key: &str) -> AppResult<ResolvedMedia> {
        for probe in self.candidates(bucket, key)? {
            match probe.target {
                ProbeTarget::Object { bucket: b, key: k } => match self.store.get(&b, &k).await {
                    Ok((data, content_type)) => {
                        return Ok(ResolvedMedia::Object {
                            data,
                            content_type,
                            source: probe.source,
                        });
                    }
                    Err(AppError::NotFound(_)) => {}
                    Err(e) => {
                        warn!(target: "media", bucket = %b, key = %k, error = %e, "Object probe failed");
                    }
                },
                ProbeTarget::Local(path) => {
                    let is_file = tokio::fs::metadata(&path)
                        .await
                        .map(|m| m.is_file())
                        .unwrap_or(false);
                    if is_file {
                        return Ok(ResolvedMedia::Local {
                            path,
                            source: probe.source,
                        });
                    }
                }
            }
        }

        debug!(target: "media", bucket, key, "No probe matched");
        Err(AppError::NotFound(format!("Media {}/{}", bucket, key)))
    }
}
