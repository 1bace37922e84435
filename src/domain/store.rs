//! Persistence contract for chains and execution history

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::domain::chain::{ChainConfiguration, ChainId};
use crate::domain::history::{ExecutionHistory, ExecutionId};
use crate::domain::DomainError;

/// Store for chain configurations and execution history
///
/// Chain reads, updates and deletes are scoped by owner: a chain owned by
/// another user is reported exactly like a missing one.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainStore: Send + Sync + std::fmt::Debug {
    /// Create a new chain. Fails with a conflict if the id is taken.
    async fn create_chain(&self, chain: ChainConfiguration) -> Result<ChainConfiguration, DomainError>;

    /// Get a chain owned by `user_id`
    async fn get_chain(
        &self,
        id: &ChainId,
        user_id: &str,
    ) -> Result<Option<ChainConfiguration>, DomainError>;

    /// List chains owned by `user_id`
    async fn list_chains(&self, user_id: &str) -> Result<Vec<ChainConfiguration>, DomainError>;

    /// Replace a chain. Fails with not found if the owner does not match.
    async fn update_chain(&self, chain: ChainConfiguration) -> Result<ChainConfiguration, DomainError>;

    /// Delete a chain owned by `user_id`. Returns whether a chain was deleted.
    async fn delete_chain(&self, id: &ChainId, user_id: &str) -> Result<bool, DomainError>;

    /// Append a history record
    async fn append_history(&self, history: ExecutionHistory) -> Result<(), DomainError>;

    /// Get a history record by id
    async fn get_history(&self, id: &ExecutionId) -> Result<Option<ExecutionHistory>, DomainError>;

    /// Most recent history records of a user, newest first
    async fn list_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionHistory>, DomainError>;
}
