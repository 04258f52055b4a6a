//! S3 storage service for migrated media.
//!
//! Every media category owns its own bucket, so operations take the bucket
//! explicitly. Supports both AWS S3 and MinIO for development.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::StorageSettings;
use crate::error::{AppError, AppResult};

/// Blob store addressed by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object, overwriting any existing one.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> AppResult<()>;

    /// Fetch an object and its stored content type.
    /// A missing object is `AppError::NotFound`.
    async fn get(&self, bucket: &str, key: &str) -> AppResult<(Vec<u8>, Option<String>)>;

    /// Check whether an object exists.
    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool>;
}

/// S3 storage client wrapper.
pub struct Storage {
    client: Client,
    /// Buckets already confirmed or created during this process
    known_buckets: Mutex<HashSet<String>>,
}

impl Storage {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &StorageSettings) -> AppResult<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            config.secret_key.expose_secret(),
            None,
            None,
            "community-media",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "S3 storage initialized: endpoint={}",
            config.endpoint.as_deref().unwrap_or("aws")
        );

        Ok(Self {
            client,
            known_buckets: Mutex::new(HashSet::new()),
        })
    }

    /// Ensure the bucket exists, creating it if necessary.
    pub async fn ensure_bucket_exists(&self, bucket: &str) -> AppResult<()> {
        if self.bucket_known(bucket) {
            return Ok(());
        }

        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("S3 bucket '{}' exists", bucket);
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    info!("Creating S3 bucket '{}'", bucket);
                    self.client
                        .create_bucket()
                        .bucket(bucket)
                        .send()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!("Failed to create bucket {}: {}", bucket, e))
                        })?;
                    info!("S3 bucket '{}' created", bucket);
                } else {
                    return Err(AppError::Storage(format!(
                        "Failed to access bucket '{}': {}",
                        bucket, service_error
                    )));
                }
            }
        }

        if let Ok(mut known) = self.known_buckets.lock() {
            known.insert(bucket.to_string());
        }
        Ok(())
    }

    fn bucket_known(&self, bucket: &str) -> bool {
        self.known_buckets
            .lock()
            .map(|known| known.contains(bucket))
            .unwrap_or(false)
    }

    /// Get the content type for a file based on its extension.
    pub fn content_type_for_extension(ext: &str) -> &'static str {
        match ext.to_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "avif" => "image/avif",
            "svg" => "image/svg+xml",
            "ico" => "image/x-icon",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "mov" => "video/quicktime",
            "mp3" => "audio/mpeg",
            "pdf" => "application/pdf",
            "json" => "application/json",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }

    /// Content type inferred from the extension of a key or path.
    pub fn content_type_for_path(path: &str) -> &'static str {
        let filename = path.rsplit('/').next().unwrap_or(path);
        match filename.rsplit_once('.') {
            Some((_, ext)) => Self::content_type_for_extension(ext),
            None => Self::content_type_for_extension(""),
        }
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> AppResult<()> {
        self.ensure_bucket_exists(bucket).await?;

        let body = aws_sdk_s3::primitives::ByteStream::from(data);
        let mut request = self.client.put_object().bucket(bucket).key(key).body(body);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.map_err(|e| {
            AppError::Storage(format!("Failed to upload {}/{} to S3: {}", bucket, key, e))
        })?;

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> AppResult<(Vec<u8>, Option<String>)> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    AppError::NotFound(format!("Object {}/{}", bucket, key))
                } else {
                    AppError::Storage(format!("Failed to get object from S3: {}", service_error))
                }
            })?;

        let content_type = response.content_type().map(String::from);
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read S3 response body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok((data, content_type))
    }

    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to check object {}/{}: {}",
                        bucket, key, service_error
                    )))
                }
            }
        }
    }
}
