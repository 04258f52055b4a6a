//! Media reference normalization.
//!
//! Stored media references come in several historical shapes:
//!
//! - relative-local: `calendar/foo.jpg`
//! - legacy-prefixed: `/uploads/calendar/foo.jpg`
//! - absolute-bucket: `https://object-storage.example/CALENDAR/events/foo.jpg`
//!
//! All of them converge on the storage proxy form
//! `/api/storage-proxy/{BUCKET}/{key}`. Normalization never fails: input it
//! cannot make sense of is returned unchanged.

use std::fmt;
use std::sync::LazyLock;

use tracing::{debug, warn};
use url::Url;

use crate::error::{AppError, AppResult};
use crate::services::category::{Category, CategoryRegistry};

/// Public prefix every canonical media URL starts with.
pub const STORAGE_PROXY_PREFIX: &str = "/api/storage-proxy/";

/// Directory segment marking the legacy upload root.
pub const LEGACY_UPLOADS_SEGMENT: &str = "uploads";

static DEFAULT_NORMALIZER: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

/// A normalized media location: `/api/storage-proxy/{bucket}/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPath {
    pub bucket: String,
    pub key: String,
}

impl CanonicalPath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a canonical proxy URL. Query strings and fragments are ignored.
    ///
    /// Returns `None` unless both a bucket and a non-empty key are present.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix(STORAGE_PROXY_PREFIX)?;
        let rest = strip_query(rest);
        let (bucket, key) = rest.split_once('/')?;
        let key = key.trim_matches('/');
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(bucket, key))
    }

    /// Last key segment.
    pub fn filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", STORAGE_PROXY_PREFIX, self.bucket, self.key)
    }
}

/// Shape of a stored media reference, for diagnostics and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceShape {
    Empty,
    Canonical,
    AbsoluteBucket,
    ExternalUrl,
    /// `data:` or `blob:` URI
    InlineData,
    LegacyPrefixed,
    RelativeLocal,
}

impl ReferenceShape {
    /// Local-path shapes that still need migrating to the proxy form.
    pub fn is_local_path(&self) -> bool {
        matches!(self, ReferenceShape::LegacyPrefixed | ReferenceShape::RelativeLocal)
    }
}

/// Maps media references onto their canonical proxy form.
#[derive(Debug, Clone)]
pub struct Normalizer {
    registry: CategoryRegistry,
    storage_hosts: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(CategoryRegistry::builtin(), Vec::new())
    }
}

impl Normalizer {
    /// Create a normalizer.
    ///
    /// `storage_hosts` lists hosts whose URLs are object-storage URLs even when
    /// the first path segment is not a registry bucket.
    pub fn new(registry: CategoryRegistry, storage_hosts: Vec<String>) -> Self {
        let storage_hosts = storage_hosts
            .into_iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        Self {
            registry,
            storage_hosts,
        }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Classify a reference without rewriting it.
    pub fn classify(&self, reference: &str) -> ReferenceShape {
        let reference = reference.trim();
        if reference.is_empty() {
            return ReferenceShape::Empty;
        }
        if CanonicalPath::parse(reference).is_some() {
            return ReferenceShape::Canonical;
        }
        if is_inline_data(reference) {
            return ReferenceShape::InlineData;
        }
        if is_absolute_url(reference) {
            return match Url::parse(reference) {
                Ok(url) if self.bucket_segments(&url).is_some() => ReferenceShape::AbsoluteBucket,
                _ => ReferenceShape::ExternalUrl,
            };
        }
        let first = strip_query(reference)
            .split('/')
            .find(|s| !s.is_empty())
            .unwrap_or("");
        if first.eq_ignore_ascii_case(LEGACY_UPLOADS_SEGMENT) {
            ReferenceShape::LegacyPrefixed
        } else {
            ReferenceShape::RelativeLocal
        }
    }

    /// Normalize a stored reference. `context` names the category the
    /// reference was found under (a registry name or alias), if known.
    ///
    /// Rules, first match wins:
    /// 1. canonical proxy form is returned unchanged;
    /// 2. object-storage URLs are re-keyed onto the proxy;
    /// 3. references naming a category (or given one as context) are
    ///    rewritten under that category's prefix, keeping the path below the
    ///    category directory (flat categories keep the filename only);
    /// 4. anything else is returned unchanged.
    pub fn normalize(&self, reference: &str, context: Option<&str>) -> String {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        if CanonicalPath::parse(trimmed).is_some() {
            return trimmed.to_string();
        }

        if is_inline_data(trimmed) {
            return trimmed.to_string();
        }

        if is_absolute_url(trimmed) {
            let url = match Url::parse(trimmed) {
                Ok(url) => url,
                Err(e) => {
                    warn!(target: "media", reference = %trimmed, error = %e, "Malformed media URL left unchanged");
                    return trimmed.to_string();
                }
            };
            return match self.rewrite_bucket_url(&url) {
                Some(canonical) => {
                    debug!(target: "media", from = %trimmed, to = %canonical, "Rewrote bucket URL");
                    canonical
                }
                None => trimmed.to_string(),
            };
        }

        match self.rewrite_by_category(trimmed, context) {
            Some(canonical) => {
                debug!(target: "media", from = %trimmed, to = %canonical, "Rewrote categorized path");
                canonical.to_string()
            }
            None => trimmed.to_string(),
        }
    }

    /// Normalize a reference about to be persisted.
    ///
    /// Unlike [`Normalizer::normalize`], a reference that cannot be made
    /// canonical is rejected so only canonical values reach the database.
    pub fn normalize_for_write(
        &self,
        reference: &str,
        context: Option<&str>,
    ) -> AppResult<CanonicalPath> {
        let normalized = self.normalize(reference, context);
        CanonicalPath::parse(&normalized).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Media reference '{}' cannot be mapped to a storage location",
                reference.trim()
            ))
        })
    }

    /// Split an object-storage URL into (bucket, remainder segments).
    ///
    /// A URL points at object storage when its host is a configured storage
    /// host, or when its first segment is a registry bucket spelled exactly.
    /// Returns `None` otherwise.
    fn bucket_segments<'u>(&self, url: &'u Url) -> Option<(&'u str, Vec<&'u str>)> {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let (bucket, remainder) = segments.split_first()?;

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let known_host = self.storage_hosts.iter().any(|h| *h == host);
        if !known_host && self.registry.by_exact_bucket(bucket).is_none() {
            return None;
        }
        Some((*bucket, remainder.to_vec()))
    }

    fn rewrite_bucket_url(&self, url: &Url) -> Option<String> {
        let (bucket, remainder) = self.bucket_segments(url)?;
        let Some((filename, dirs)) = remainder.split_last() else {
            warn!(target: "media", url = %url, "Bucket URL has no object path, left unchanged");
            return None;
        };

        let flat = self
            .registry
            .by_bucket(bucket)
            .filter(|c| c.flat)
            .or_else(|| {
                self.registry
                    .find_in_segments(dirs.iter().copied())
                    .filter(|c| c.flat)
            });

        if let Some(category) = flat {
            if dirs.len() > 1 || dirs.first().is_some_and(|d| !category.matches(d)) {
                // Flat categories drop intermediate directories.
                warn!(
                    target: "media",
                    url = %url,
                    category = category.name,
                    "Flat category URL nested under extra directories, keying by filename"
                );
            }
            return Some(category.canonical_path(filename).to_string());
        }

        // Registry buckets are emitted in registry spelling.
        let bucket = self
            .registry
            .by_bucket(bucket)
            .map_or(bucket, |category| category.bucket);
        Some(format!(
            "{}{}/{}",
            STORAGE_PROXY_PREFIX,
            bucket,
            remainder.join("/")
        ))
    }

    fn rewrite_by_category(&self, reference: &str, context: Option<&str>) -> Option<CanonicalPath> {
        let path = strip_query(reference);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (filename, dirs) = segments.split_last()?;
        if !looks_like_file(filename) {
            return None;
        }

        let named = dirs
            .iter()
            .enumerate()
            .find_map(|(i, d)| self.registry.lookup(d).map(|c| (c, i + 1)));
        let (category, start): (&Category, usize) = match named {
            Some(found) => found,
            None => {
                let category = context.and_then(|c| self.registry.lookup(c))?;
                let start = usize::from(
                    dirs.first()
                        .is_some_and(|d| d.eq_ignore_ascii_case(LEGACY_UPLOADS_SEGMENT)),
                );
                (category, start)
            }
        };

        Some(category.canonical_object(&segments[start..].join("/")))
    }
}

/// Normalize with the built-in registry and no extra storage hosts.
pub fn normalize(reference: &str, context: Option<&str>) -> String {
    DEFAULT_NORMALIZER.normalize(reference, context)
}

fn is_absolute_url(value: &str) -> bool {
    value.contains("://")
}

fn is_inline_data(value: &str) -> bool {
    let lower = value.get(..5).unwrap_or("").to_ascii_lowercase();
    lower == "data:" || lower == "blob:"
}

fn strip_query(value: &str) -> &str {
    value.split(['?', '#']).next().unwrap_or(value)
}

fn looks_like_file(segment: &str) -> bool {
    match segment.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && !ext.is_empty(),
        None => false,
    }
}
