//! Community media server - main entry point.
//!
//! Serves the storage proxy and legacy media redirects.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use community_media_lib::api::{self, ApiDoc, storage_proxy::ProxySettings};
use community_media_lib::config::Config;
use community_media_lib::db::DbPool;
use community_media_lib::middleware::{LegacyRedirect, RequestLogger};
use community_media_lib::services::{
    CategoryRegistry, MediaResolver, Normalizer, ObjectStore, Storage,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL and S3 credentials must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Community Media Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let pool = match DbPool::new(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };
    info!("Database connection established");

    if let Err(e) = pool.run_migrations().await {
        error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    let storage: Arc<dyn ObjectStore> = match Storage::new(&config.storage).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let registry = CategoryRegistry::builtin();
    info!(
        "Media registry v{} with {} categories",
        registry.version(),
        registry.all().len()
    );
    info!(
        "Legacy root: {}, production root: {}",
        config.media.legacy_root.display(),
        config.media.production_root.display()
    );

    let normalizer = Arc::new(Normalizer::new(
        registry.clone(),
        config.media.storage_hosts.clone(),
    ));
    let resolver = web::Data::new(MediaResolver::new(
        storage,
        registry,
        config.media.legacy_root.clone(),
        config.media.production_root.clone(),
    ));
    let proxy_settings = web::Data::new(ProxySettings {
        cache_max_age_secs: config.media.cache_max_age_secs,
    });

    let bind_address = config.bind_address();
    let is_development = config.is_development();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };

    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "HEAD", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        } else {
            // Same-origin only
            Cors::default()
                .allowed_methods(vec!["GET", "HEAD", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        };

        App::new()
            .wrap(LegacyRedirect::new(normalizer.clone()))
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(web::Data::new(pool.clone()))
            .app_data(resolver.clone())
            .app_data(proxy_settings.clone())
            .service(web::scope("/api/v1").configure(api::configure_health_routes))
            .configure(api::configure_storage_proxy_routes)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
