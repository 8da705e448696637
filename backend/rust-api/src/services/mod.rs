use std::sync::Arc;

use crate::config::Config;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

pub mod generation;
pub mod normalizer;
pub mod orchestrator;
pub mod progression;
pub mod prompt_builder;
pub mod store;

use generation::{GenerationError, GenerationProvider};
use store::StoreError;

/// Failure surface of the sprint engine. Handlers map these onto HTTP
/// statuses; anything unexpected funnels into `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum SprintError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("generation provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("generation provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("generation provider timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("provider returned malformed content: {0}")]
    MalformedContent(String),

    #[error("provider returned no usable content")]
    EmptyContent,

    #[error("resource already exists")]
    AlreadyExists,

    /// The track row exists but some lessons or questions did not land.
    /// `track_id` points at the partial draft so operators can inspect it.
    #[error("track {track_id} was persisted partially: {detail}")]
    PartialSynthesis { track_id: String, detail: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<GenerationError> for SprintError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Unavailable(detail) => SprintError::ProviderUnavailable(detail),
            GenerationError::Rejected(detail) => SprintError::ProviderRejected(detail),
            GenerationError::Timeout(secs) => SprintError::ProviderTimeout(secs),
        }
    }
}

impl From<StoreError> for SprintError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => SprintError::AlreadyExists,
            StoreError::NotFound => SprintError::NotFound("resource".to_string()),
            StoreError::PartialSynthesis { track_id, detail } => {
                SprintError::PartialSynthesis { track_id, detail }
            }
            StoreError::Backend(err) => SprintError::Internal(err),
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub provider: Arc<dyn GenerationProvider>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
        provider: Arc<dyn GenerationProvider>,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self {
            config,
            mongo,
            redis,
            provider,
        })
    }

    /// Orchestrator wired to the live Mongo store and the Redis reply cache.
    pub fn orchestrator(&self) -> orchestrator::SprintOrchestrator {
        let store = Arc::new(store::mongo::MongoSprintStore::new(self.mongo.clone()));
        orchestrator::SprintOrchestrator::new(store, self.provider.clone())
            .with_reply_cache(self.redis.clone())
    }
}
