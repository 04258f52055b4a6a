//! Shared test helpers for media E2E tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use actix_web::{App, dev::ServiceResponse, test, web};
use async_trait::async_trait;
use community_media_lib::api::{self, storage_proxy::ProxySettings};
use community_media_lib::error::{AppError, AppResult};
use community_media_lib::middleware::{LegacyRedirect, RequestLogger};
use community_media_lib::services::{
    CategoryRegistry, MediaResolver, Normalizer, ObjectStore,
};

/// Cache lifetime configured for test apps.
pub const TEST_CACHE_MAX_AGE: u64 = 120;

/// Object store backed by a map.
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryStore {
    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        self
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: Option<&str>,
    ) -> AppResult<()> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> AppResult<(Vec<u8>, Option<String>)> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|data| (data.clone(), None))
            .ok_or_else(|| AppError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }
}

/// Write a file, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Create a test app serving the storage proxy behind the legacy redirects.
pub async fn create_test_app(
    store: Arc<dyn ObjectStore>,
    legacy_root: &Path,
    production_root: &Path,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse<impl actix_web::body::MessageBody>,
    Error = actix_web::Error,
> {
    let registry = CategoryRegistry::builtin();
    let resolver = MediaResolver::new(
        store,
        registry.clone(),
        legacy_root.to_path_buf(),
        production_root.to_path_buf(),
    );

    test::init_service(
        App::new()
            .wrap(LegacyRedirect::new(Arc::new(Normalizer::new(registry, Vec::new()))))
            .wrap(RequestLogger)
            .app_data(web::Data::new(resolver))
            .app_data(web::Data::new(ProxySettings {
                cache_max_age_secs: TEST_CACHE_MAX_AGE,
            }))
            .configure(api::configure_storage_proxy_routes),
    )
    .await
}
