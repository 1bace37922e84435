//! Chain controller
//!
//! Orchestrates multi-step workflows across the game's backend services:
//! - Chain definitions with templated steps, conditions and routing
//! - Per-user chain storage and execution history
//! - HTTP API plus a one-shot CLI runner

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api::state::AppState;
use config::StorageBackend;
use domain::ChainStore;
use infrastructure::{
    chain::{ChainEngine, EngineConfig},
    http::{HttpStepExecutor, ServiceRegistry},
    pipeline::HttpPipelineRunner,
    services::ChainService,
    store::{InMemoryChainStore, PostgresChainStore, PostgresConfig},
};
use tracing::info;

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let registry = Arc::new(ServiceRegistry::from_config(&config.services));
    let service = create_chain_service(config, registry.clone()).await?;

    Ok(AppState::new(Arc::new(service), registry))
}

/// Wire store, engine and pipeline runner into a chain service
pub async fn create_chain_service(
    config: &AppConfig,
    registry: Arc<ServiceRegistry>,
) -> anyhow::Result<ChainService> {
    let store = create_store(config).await?;

    let step_executor = HttpStepExecutor::new(
        registry.clone(),
        Duration::from_millis(config.engine.step_timeout_ms),
    )?;
    let engine = ChainEngine::with_config(
        Arc::new(step_executor),
        store.clone(),
        EngineConfig::from(&config.engine),
    );

    let mut service = ChainService::new(store, Arc::new(engine), registry);

    if let Some(url) = config.pipeline.url.as_deref() {
        info!(url = %url, "Pipeline runner enabled");
        let runner =
            HttpPipelineRunner::new(url, Duration::from_millis(config.pipeline.timeout_ms))?;
        service = service.with_pipeline_runner(Arc::new(runner));
    }

    Ok(service)
}

async fn create_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ChainStore>> {
    info!("Storage backend: {:?}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::InMemory => Ok(Arc::new(InMemoryChainStore::new())),
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .clone()
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .context("storage.database_url or DATABASE_URL is required for postgres")?;

            info!("Connecting to PostgreSQL...");
            let pg_config =
                PostgresConfig::new(url).with_max_connections(config.storage.max_connections);
            let store = PostgresChainStore::connect(&pg_config).await?;
            info!("PostgreSQL connection established");

            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_state_uses_memory_store() {
        let state = create_app_state().await.unwrap();

        let chains = state.chain_service.list("admin").await.unwrap();
        assert!(chains.is_empty());
    }

    #[tokio::test]
    async fn test_postgres_without_url_fails() {
        if std::env::var("DATABASE_URL").is_ok() {
            return;
        }

        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        config.storage.database_url = None;

        assert!(create_app_state_with_config(&config).await.is_err());
    }
}
