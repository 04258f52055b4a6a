//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Community Media Server",
        version = "0.1.0",
        description = "Storage proxy and health endpoints for community site media"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        api::health::health,
        api::health::ready,
        api::storage_proxy::storage_proxy,
    ),
    components(
        schemas(
            error::ErrorResponse,
            api::health::HealthResponse,
            api::health::ReadyResponse,
            models::MigrationStatus,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Media", description = "Canonical media delivery")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_proxy_route() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/storage-proxy/{bucket}/{key}"));
        assert!(doc.paths.paths.contains_key("/api/v1/health"));
    }
}
