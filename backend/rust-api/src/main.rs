#![allow(dead_code)]

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skillsprint_api::services::generation::{GenerationProvider, HttpGenerationClient};
use skillsprint_api::services::store::MongoSprintStore;
use skillsprint_api::{config::Config, create_router, services::AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skillsprint_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SkillSprint Rust API");

    // Load configuration
    let config = Config::load().expect("Failed to load configuration");
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    // Initialize database connections
    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to MongoDB");
    tracing::info!("MongoDB connected");

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create Redis client");

    // Generation provider (OpenAI-compatible endpoint)
    let provider: Arc<dyn GenerationProvider> = Arc::new(
        HttpGenerationClient::new(&config.generation)
            .expect("Failed to create generation client"),
    );

    // Build application state
    let app_state = Arc::new(
        AppState::new(config, mongo_client, redis_client, provider)
            .await
            .expect("Failed to initialize application state"),
    );

    // Per-day sprint uniqueness lives in the (user_id, date) index; do not
    // serve traffic without it.
    MongoSprintStore::new(app_state.mongo.clone())
        .ensure_indexes()
        .await
        .expect("Failed to create MongoDB indexes");
    tracing::info!("MongoDB indexes ensured");

    // Build router
    let app = create_router(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await.unwrap();

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
