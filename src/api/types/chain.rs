//! Chain API query parameters and response bodies

use serde::{Deserialize, Serialize};

use crate::domain::chain::{ChainConfiguration, ModuleInfo};
use crate::domain::ExecutionHistory;

use super::error::ApiError;

/// `?userId=` scoping parameter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    #[serde(default, rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
}

impl UserQuery {
    /// The user id, rejecting absent or blank values
    pub fn require(&self) -> Result<&str, ApiError> {
        match self.user_id.as_deref().map(str::trim) {
            Some(user_id) if !user_id.is_empty() => Ok(user_id),
            _ => Err(ApiError::missing_param("userId")),
        }
    }
}

/// `?limit=` for history listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainListResponse {
    pub chains: Vec<ChainConfiguration>,
    pub total: usize,
}

impl From<Vec<ChainConfiguration>> for ChainListResponse {
    fn from(chains: Vec<ChainConfiguration>) -> Self {
        Self {
            total: chains.len(),
            chains,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionListResponse {
    pub executions: Vec<ExecutionHistory>,
    pub total: usize,
}

impl From<Vec<ExecutionHistory>> for ExecutionListResponse {
    fn from(executions: Vec<ExecutionHistory>) -> Self {
        Self {
            total: executions.len(),
            executions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub id: String,
    pub deleted: bool,
}

/// Module metadata plus whether a base URL is configured for it
#[derive(Debug, Clone, Serialize)]
pub struct ModuleResponse {
    #[serde(flatten)]
    pub info: ModuleInfo,
    pub configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModulesResponse {
    pub modules: Vec<ModuleResponse>,
}
