use axum_helpers::server::{create_production_app, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_photo_embeddings::{
    EmbeddingGenerator, HttpImageEmbedder, InMemoryEmbeddingStore, InMemoryPhotoDirectory,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::{AppState, PhotoEmbeddingService};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing with ErrorLayer for span trace capture
    init_tracing(&config.environment);

    observability::init_metrics().map_err(|e| eyre::eyre!("Metrics init failed: {}", e))?;

    let photos = match &config.photo_catalog {
        Some(path) => InMemoryPhotoDirectory::from_json_file(path)
            .await
            .map_err(|e| eyre::eyre!("Failed to load photo catalog {}: {}", path.display(), e))?,
        None => {
            warn!("PHOTO_CATALOG_PATH not set, starting with an empty photo directory");
            InMemoryPhotoDirectory::new()
        }
    };

    let generator: Option<Arc<dyn EmbeddingGenerator>> = match config.generator.clone() {
        Some(generator_config) => {
            let embedder = HttpImageEmbedder::new(generator_config);
            info!(model = embedder.model(), "Embedding generator configured");
            let embedder: Arc<dyn EmbeddingGenerator> = Arc::new(embedder);
            Some(embedder)
        }
        None => {
            warn!("EMBEDDING_API_URL not set, embedding generation is disabled");
            None
        }
    };

    let shutdown = CancellationToken::new();
    let embeddings = PhotoEmbeddingService::new(
        InMemoryEmbeddingStore::new(),
        photos,
        generator,
        config.batch.clone(),
    )
    .with_shutdown_token(shutdown.clone());

    let state = AppState {
        config,
        embeddings: Arc::new(embeddings),
        shutdown,
    };

    let api_routes = api::routes(&state);

    // create_router adds docs/middleware to our composed routes
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes).await?;

    // - /health: liveness check with app name/version
    // - /ready: generator configured and photo directory answering
    // - /metrics: Prometheus scrape
    let app = router
        .merge(health_router(state.config.app))
        .merge(api::ready_router(state.clone()))
        .merge(api::metrics_router())
        .layer(axum::middleware::from_fn(observability::metrics_middleware));

    info!(
        concurrency = state.config.batch.concurrency,
        strategy = state.config.batch.strategy.as_str(),
        "Starting atlas API with graceful shutdown ({:?} timeout)",
        state.config.server.shutdown_timeout
    );

    let server_config = state.config.server.clone();
    create_production_app(
        app,
        &server_config,
        server_config.shutdown_timeout,
        async move {
            // Ends open progress streams so their connections can drain
            info!("Shutting down: cancelling running embedding batches");
            state.shutdown.cancel();
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Atlas API shutdown complete");
    Ok(())
}
