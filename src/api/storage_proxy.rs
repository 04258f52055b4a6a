//! Storage proxy handler.
//!
//! Serves `/api/storage-proxy/{bucket}/{key..}` through the [`MediaResolver`]
//! probe list. Misses and unsafe paths are a plain 404 that never names a
//! filesystem location.

use actix_files::NamedFile;
use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse, web};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::services::resolver::{MediaResolver, ResolvedMedia};
use crate::services::storage::Storage;

/// Header naming the probe that served a response.
pub const MEDIA_SOURCE_HEADER: &str = "x-media-source";

/// Response settings for proxied media.
#[derive(Debug, Clone, Copy)]
pub struct ProxySettings {
    pub cache_max_age_secs: u64,
}

fn cache_control(settings: &ProxySettings) -> String {
    format!("public, max-age={}", settings.cache_max_age_secs)
}

/// Serve a media file by canonical bucket and key.
#[utoipa::path(
    get,
    path = "/api/storage-proxy/{bucket}/{key}",
    tag = "Media",
    params(
        ("bucket" = String, Path, description = "Category bucket, e.g. CALENDAR"),
        ("key" = String, Path, description = "Object key, e.g. events/party.jpg")
    ),
    responses(
        (status = 200, description = "Media file contents"),
        (status = 404, description = "Media not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn storage_proxy(
    req: HttpRequest,
    resolver: web::Data<MediaResolver>,
    settings: web::Data<ProxySettings>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (bucket, key) = path.into_inner();
    let bucket = urlencoding::decode(&bucket)
        .map_err(|_| AppError::NotFound("Undecodable bucket".to_string()))?
        .into_owned();
    let key = urlencoding::decode(&key)
        .map_err(|_| AppError::NotFound("Undecodable key".to_string()))?
        .into_owned();

    let resolved = match resolver.resolve(&bucket, &key).await {
        Ok(resolved) => resolved,
        Err(AppError::InvalidInput(msg)) => {
            info!(target: "media", bucket = %bucket, key = %key, "Rejected proxy path");
            return Err(AppError::NotFound(msg));
        }
        Err(e) => return Err(e),
    };

    let source = resolved.source();
    debug!(target: "media", bucket = %bucket, key = %key, source = source.as_str(), "Serving media");

    let mut response = match resolved {
        ResolvedMedia::Local { path, .. } => NamedFile::open_async(&path).await?.into_response(&req),
        ResolvedMedia::Object {
            data, content_type, ..
        } => {
            let content_type = content_type
                .unwrap_or_else(|| Storage::content_type_for_path(&key).to_string());
            HttpResponse::Ok().content_type(content_type).body(data)
        }
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&cache_control(&settings)) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    headers.insert(
        HeaderName::from_static(MEDIA_SOURCE_HEADER),
        HeaderValue::from_static(source.as_str()),
    );

    Ok(response)
}

/// Configure storage proxy routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/storage-proxy/{bucket}/{key:.*}").route(web::get().to(storage_proxy)),
    );
}
