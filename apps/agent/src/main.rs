use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_agent::config::{self, BrowserMode, EmbeddingBackend, StoreBackend};
use cadence_agent::models::load_catalog;
use cadence_agent::repositories::{ConversationStore, MemoryConversationStore, PgConversationStore};
use cadence_agent::routes::{build_router, ChatState, HealthState, ResolveState};
use cadence_agent::services::{
    AgentGraph, ConversationService, Embedder, EmbeddingIndex, HashingEmbedder, HealthService,
    LoggingOpener, OllamaChatModel, OllamaEmbedder, SystemBrowser, ToolRegistry, UrlOpener,
};
use cadence_ollama_client::OllamaClient;

/// Build the CORS layer based on configuration.
///
/// Configured origins are always honored. Without `CORS_ORIGINS`, production
/// rejects cross-origin requests and development allows any origin.
fn build_cors_layer(config: &config::Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                tracing::info!(
                    "CORS configured with {} allowed origin(s)",
                    allowed_origins.len()
                );
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PATCH,
                        Method::DELETE,
                        Method::OPTIONS,
                    ])
                    .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
                    .max_age(std::time::Duration::from_secs(3600))
            }
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected."
            );
            CorsLayer::new()
        }
        _ => CorsLayer::permissive(),
    }
}

async fn connect_store(config: &config::Config) -> anyhow::Result<Arc<dyn ConversationStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let database = config.database();
            tracing::info!("Connecting to database...");

            let pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .min_connections(database.min_connections)
                .acquire_timeout(std::time::Duration::from_secs(database.connect_timeout_secs))
                .idle_timeout(std::time::Duration::from_secs(database.idle_timeout_secs))
                .connect(&database.url)
                .await?;

            let store = PgConversationStore::new(pool);

            tracing::info!("Running database migrations...");
            store.migrate().await?;
            tracing::info!("Migrations completed successfully");

            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory conversation store, sessions are lost on restart");
            Ok(Arc::new(MemoryConversationStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = config::Config::from_env()?;

    tracing::info!(
        environment = %config.environment(),
        "Starting Cadence agent on port {}",
        config.port
    );

    let store = connect_store(&config).await?;

    let ollama = OllamaClient::new(config.ollama())?;

    let embedder: Arc<dyn Embedder> = match config.embedding_backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(ollama.clone())),
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::default()),
    };

    let catalog = match load_catalog(&config.catalog_path) {
        Ok(items) => items,
        Err(e) if e.is_missing() => {
            tracing::warn!(
                path = %config.catalog_path.display(),
                "Playlist catalog not found, play_playlist will never match"
            );
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(items = catalog.len(), embedder = embedder.name(), "Building playlist index...");
    let index = Arc::new(EmbeddingIndex::build(catalog, embedder).await?);

    let opener: Arc<dyn UrlOpener> = match config.browser_mode {
        BrowserMode::System => Arc::new(SystemBrowser),
        BrowserMode::Log => Arc::new(LoggingOpener),
    };

    let tools = Arc::new(ToolRegistry::new(
        index.clone(),
        opener,
        config.video_search_url.clone(),
        config.playlist_url.clone(),
        config.tool_timeout(),
    ));

    let graph = AgentGraph::new(
        Arc::new(OllamaChatModel::new(ollama.clone())),
        tools,
        config.max_rounds,
        config.model_timeout(),
    );

    let service = Arc::new(ConversationService::new(
        store.clone(),
        graph,
        config.session_list_limit,
    ));

    let health = HealthService::new(
        store,
        ollama,
        config.embedding_backend == EmbeddingBackend::Ollama,
    );

    let app = build_router(
        HealthState::new(health),
        ChatState::new(service),
        ResolveState { index },
    )
    .layer(TraceLayer::new_for_http())
    .layer(build_cors_layer(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
