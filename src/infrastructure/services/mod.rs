//! Infrastructure services

mod chain_service;

pub use chain_service::{
    AdHocExecuteRequest, ChainService, CreateChainRequest, ExecuteChainRequest,
    DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};
