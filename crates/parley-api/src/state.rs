//! Application state wiring all services together.
//!
//! Services in parley-core are generic over repository traits; AppState pins
//! them to the SQLite implementations and shares one database pool between
//! the queue consumer and the HTTP read API.

use std::sync::Arc;

use parley_core::chat::query::ChatQueryService;
use parley_core::ingest::pipeline::IngestionPipeline;
use parley_infra::sqlite::chat::SqliteChatRepository;
use parley_infra::sqlite::pool::DatabasePool;
use parley_infra::sqlite::users::SqliteIdentityResolver;
use parley_types::config::ServiceConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcretePipeline = IngestionPipeline<SqliteChatRepository, SqliteIdentityResolver>;

pub type ConcreteQueryService = ChatQueryService<SqliteChatRepository>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ConcretePipeline>,
    pub query_service: Arc<ConcreteQueryService>,
    pub db_pool: DatabasePool,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// Open the database (applying migrations) and wire services.
    pub async fn init(config: ServiceConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&config.database.url, config.database.max_readers).await?;

        let pipeline = IngestionPipeline::new(
            SqliteChatRepository::new(db_pool.clone()),
            SqliteIdentityResolver::new(db_pool.clone()),
            &config.ingest,
        );
        let query_service = ChatQueryService::new(SqliteChatRepository::new(db_pool.clone()));

        Ok(Self {
            pipeline: Arc::new(pipeline),
            query_service: Arc::new(query_service),
            db_pool,
            config: Arc::new(config),
        })
    }
}
