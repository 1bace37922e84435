//! API request and response types

pub mod chain;
pub mod error;
pub mod json;

pub use chain::{
    ChainListResponse, DeleteResponse, ExecutionListResponse, HistoryQuery, ModuleResponse,
    ModulesResponse, UserQuery,
};
pub use error::{ApiError, ApiErrorResponse};
pub use json::Json;
