//! In-memory chain store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::chain::{ChainConfiguration, ChainId};
use crate::domain::{ChainStore, DomainError, ExecutionHistory, ExecutionId};

/// In-memory implementation of ChainStore
#[derive(Debug, Default)]
pub struct InMemoryChainStore {
    chains: Arc<RwLock<HashMap<String, ChainConfiguration>>>,
    history: Arc<RwLock<Vec<ExecutionHistory>>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with chains
    pub fn with_chains(chains: Vec<ChainConfiguration>) -> Self {
        let map = chains
            .into_iter()
            .map(|c| (c.id().as_str().to_string(), c))
            .collect();

        Self {
            chains: Arc::new(RwLock::new(map)),
            history: Arc::default(),
        }
    }
}

#[async_trait]
impl ChainStore for InMemoryChainStore {
    async fn create_chain(&self, chain: ChainConfiguration) -> Result<ChainConfiguration, DomainError> {
        let mut chains = self.chains.write().await;

        if chains.contains_key(chain.id().as_str()) {
            return Err(DomainError::conflict(format!(
                "Chain '{}' already exists",
                chain.id()
            )));
        }

        chains.insert(chain.id().as_str().to_string(), chain.clone());
        Ok(chain)
    }

    async fn get_chain(
        &self,
        id: &ChainId,
        user_id: &str,
    ) -> Result<Option<ChainConfiguration>, DomainError> {
        let chains = self.chains.read().await;
        Ok(chains
            .get(id.as_str())
            .filter(|c| c.is_owned_by(user_id))
            .cloned())
    }

    async fn list_chains(&self, user_id: &str) -> Result<Vec<ChainConfiguration>, DomainError> {
        let chains = self.chains.read().await;
        let mut owned: Vec<_> = chains
            .values()
            .filter(|c| c.is_owned_by(user_id))
            .cloned()
            .collect();

        owned.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(owned)
    }

    async fn update_chain(&self, chain: ChainConfiguration) -> Result<ChainConfiguration, DomainError> {
        let mut chains = self.chains.write().await;

        match chains.get(chain.id().as_str()) {
            Some(existing) if existing.is_owned_by(chain.user_id()) => {}
            _ => {
                return Err(DomainError::not_found(format!(
                    "Chain '{}' not found",
                    chain.id()
                )));
            }
        }

        chains.insert(chain.id().as_str().to_string(), chain.clone());
        Ok(chain)
    }

    async fn delete_chain(&self, id: &ChainId, user_id: &str) -> Result<bool, DomainError> {
        let mut chains = self.chains.write().await;

        if !chains.get(id.as_str()).is_some_and(|c| c.is_owned_by(user_id)) {
            return Ok(false);
        }

        Ok(chains.remove(id.as_str()).is_some())
    }

    async fn append_history(&self, history: ExecutionHistory) -> Result<(), DomainError> {
        let mut records = self.history.write().await;

        if records.iter().any(|h| h.id == history.id) {
            return Err(DomainError::conflict(format!(
                "Execution '{}' already recorded",
                history.id
            )));
        }

        records.push(history);
        Ok(())
    }

    async fn get_history(&self, id: &ExecutionId) -> Result<Option<ExecutionHistory>, DomainError> {
        let records = self.history.read().await;
        Ok(records.iter().find(|h| h.id == *id).cloned())
    }

    async fn list_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionHistory>, DomainError> {
        let records = self.history.read().await;
        let mut owned: Vec<_> = records
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();

        owned.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        owned.truncate(limit);
        Ok(owned)
    }
}
