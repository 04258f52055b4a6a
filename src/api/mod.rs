//! API endpoint modules.

pub mod health;
pub mod openapi;
pub mod storage_proxy;

pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use storage_proxy::configure_routes as configure_storage_proxy_routes;
