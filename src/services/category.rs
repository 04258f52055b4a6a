//! Shared media category registry.
//!
//! Every component that needs to know where a category's media lives (the
//! normalizer, the directory mirror, the migration job, the reference
//! rewriter and the storage proxy) reads it from here. Bump
//! [`REGISTRY_VERSION`] whenever a bucket, prefix or directory changes so
//! ledger rows written under an older layout can be told apart.

use crate::services::normalizer::CanonicalPath;

/// Version of the built-in category layout.
pub const REGISTRY_VERSION: u32 = 1;

/// A logical media grouping mapped to a bucket, key prefix and directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Registry name, also accepted as a context hint.
    pub name: &'static str,
    /// Object-storage bucket.
    pub bucket: &'static str,
    /// Object-key prefix inside the bucket.
    pub prefix: &'static str,
    /// Directory name under both the legacy and production roots.
    pub directory: &'static str,
    /// Historical spellings found in stored references.
    pub aliases: &'static [&'static str],
    /// Flat categories key objects by filename only, whatever the source depth.
    pub flat: bool,
}

impl Category {
    /// Check whether a path segment or context hint names this category.
    pub fn matches(&self, token: &str) -> bool {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            return false;
        }
        token == self.name
            || token == self.directory
            || token == self.prefix
            || self.aliases.iter().any(|alias| *alias == token)
    }

    /// Object key for a file of this category.
    pub fn storage_key(&self, filename: &str) -> String {
        format!("{}/{}", self.prefix, filename)
    }

    /// Object key for a file at `relative` (forward slashes) below the
    /// category directory. Flat categories keep the filename only.
    pub fn object_key(&self, relative: &str) -> String {
        let relative = relative.trim_matches('/');
        if self.flat {
            self.storage_key(relative.rsplit('/').next().unwrap_or(relative))
        } else {
            self.storage_key(relative)
        }
    }

    /// Path below the category directory for an object key of this
    /// category, the inverse of [`Category::object_key`].
    pub fn relative_path<'k>(&self, key: &'k str) -> &'k str {
        let filename = key.rsplit('/').next().unwrap_or(key);
        if self.flat {
            return filename;
        }
        key.strip_prefix(self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(filename)
    }

    /// Canonical proxy location for a file of this category.
    pub fn canonical_path(&self, filename: &str) -> CanonicalPath {
        CanonicalPath::new(self.bucket, self.storage_key(filename))
    }

    /// Canonical proxy location for a file at `relative` below the category
    /// directory.
    pub fn canonical_object(&self, relative: &str) -> CanonicalPath {
        CanonicalPath::new(self.bucket, self.object_key(relative))
    }
}

/// Built-in categories of the community site.
const BUILTIN_CATEGORIES: &[Category] = &[
    Category {
        name: "calendar",
        bucket: "CALENDAR",
        prefix: "events",
        directory: "calendar",
        aliases: &["events", "event", "calendar-events", "event-media", "calendar-media"],
        flat: true,
    },
    Category {
        name: "forum",
        bucket: "FORUM",
        prefix: "forum",
        directory: "forum",
        aliases: &["forum-media", "forum-posts", "posts"],
        flat: false,
    },
    Category {
        name: "vendors",
        bucket: "VENDORS",
        prefix: "vendors",
        directory: "vendors",
        aliases: &["vendor", "vendor-media", "vendor-logos"],
        flat: false,
    },
    Category {
        name: "real-estate",
        bucket: "REAL_ESTATE",
        prefix: "real-estate",
        directory: "real-estate",
        aliases: &["real_estate", "realestate", "listings", "real-estate-media"],
        flat: false,
    },
    Category {
        name: "banner-slides",
        bucket: "BANNER",
        prefix: "banner-slides",
        directory: "banner-slides",
        aliases: &["banners", "banner", "banner_slides"],
        flat: false,
    },
    Category {
        name: "community",
        bucket: "COMMUNITY",
        prefix: "community",
        directory: "community",
        aliases: &["community-media", "pages"],
        flat: false,
    },
    Category {
        name: "avatars",
        bucket: "PROFILES",
        prefix: "avatars",
        directory: "avatars",
        aliases: &["avatar", "profile-images", "profiles"],
        flat: false,
    },
];

/// Lookup table over a set of categories.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    version: u32,
    categories: Vec<Category>,
}

impl CategoryRegistry {
    /// Create a registry from an explicit category list.
    pub fn new(version: u32, categories: Vec<Category>) -> Self {
        Self {
            version,
            categories,
        }
    }

    /// The built-in community site layout.
    pub fn builtin() -> Self {
        Self::new(REGISTRY_VERSION, BUILTIN_CATEGORIES.to_vec())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn all(&self) -> &[Category] {
        &self.categories
    }

    /// Find the category a segment or hint refers to.
    pub fn lookup(&self, token: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.matches(token))
    }

    /// Find the category owning a bucket (bucket names compare case-insensitively).
    pub fn by_bucket(&self, bucket: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.bucket.eq_ignore_ascii_case(bucket))
    }

    /// Find the category whose bucket is spelled exactly `bucket`.
    pub fn by_exact_bucket(&self, bucket: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.bucket == bucket)
    }

    /// First category named by any of the given path segments.
    pub fn find_in_segments<'a, I>(&self, segments: I) -> Option<&Category>
    where
        I: IntoIterator<Item = &'a str>,
    {
        segments.into_iter().find_map(|s| self.lookup(s))
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
