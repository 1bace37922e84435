//! Application state for shared services

use std::sync::Arc;

use serde_json::Value;

use crate::domain::chain::{ChainConfiguration, ChainRunResult};
use crate::domain::{DomainError, ExecutionHistory};
use crate::infrastructure::http::ServiceRegistry;
use crate::infrastructure::services::{
    AdHocExecuteRequest, ChainService, CreateChainRequest, ExecuteChainRequest,
};

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub chain_service: Arc<dyn ChainServiceTrait>,
    pub registry: Arc<ServiceRegistry>,
}

impl AppState {
    pub fn new(chain_service: Arc<dyn ChainServiceTrait>, registry: Arc<ServiceRegistry>) -> Self {
        Self {
            chain_service,
            registry,
        }
    }
}

/// Trait for chain service operations
#[async_trait::async_trait]
pub trait ChainServiceTrait: Send + Sync {
    async fn get(&self, id: &str, user_id: &str) -> Result<Option<ChainConfiguration>, DomainError>;
    async fn list(&self, user_id: &str) -> Result<Vec<ChainConfiguration>, DomainError>;
    async fn create(&self, request: CreateChainRequest) -> Result<ChainConfiguration, DomainError>;
    async fn update(&self, id: &str, user_id: &str, patch: Value) -> Result<ChainConfiguration, DomainError>;
    async fn delete(&self, id: &str, user_id: &str) -> Result<bool, DomainError>;
    async fn execute(
        &self,
        id: &str,
        user_id: &str,
        request: ExecuteChainRequest,
    ) -> Result<ChainRunResult, DomainError>;
    async fn execute_ad_hoc(&self, request: AdHocExecuteRequest) -> Result<ChainRunResult, DomainError>;
    async fn get_execution(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<ExecutionHistory>, DomainError>;
    async fn list_executions(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionHistory>, DomainError>;
}

#[async_trait::async_trait]
impl ChainServiceTrait for ChainService {
    async fn get(&self, id: &str, user_id: &str) -> Result<Option<ChainConfiguration>, DomainError> {
        ChainService::get(self, id, user_id).await
    }

    async fn list(&self, user_id: &str) -> Result<Vec<ChainConfiguration>, DomainError> {
        ChainService::list(self, user_id).await
    }

    async fn create(&self, request: CreateChainRequest) -> Result<ChainConfiguration, DomainError> {
        ChainService::create(self, request).await
    }

    async fn update(&self, id: &str, user_id: &str, patch: Value) -> Result<ChainConfiguration, DomainError> {
        ChainService::update(self, id, user_id, patch).await
    }

    async fn delete(&self, id: &str, user_id: &str) -> Result<bool, DomainError> {
        ChainService::delete(self, id, user_id).await
    }

    async fn execute(
        &self,
        id: &str,
        user_id: &str,
        request: ExecuteChainRequest,
    ) -> Result<ChainRunResult, DomainError> {
        ChainService::execute(self, id, user_id, request).await
    }

    async fn execute_ad_hoc(&self, request: AdHocExecuteRequest) -> Result<ChainRunResult, DomainError> {
        ChainService::execute_ad_hoc(self, request).await
    }

    async fn get_execution(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<ExecutionHistory>, DomainError> {
        ChainService::get_execution(self, id, user_id).await
    }

    async fn list_executions(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionHistory>, DomainError> {
        ChainService::list_executions(self, user_id, limit).await
    }
}
