//! Execution history endpoints

use axum::extract::{Path, Query, State};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, ExecutionListResponse, HistoryQuery, Json, UserQuery};
use crate::domain::ExecutionHistory;

/// GET /execution/{execution_id}?userId=
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ExecutionHistory>, ApiError> {
    let user_id = query.require()?;
    debug!(execution_id = %execution_id, user_id = %user_id, "Getting execution");

    let history = state
        .chain_service
        .get_execution(&execution_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Execution '{}' not found", execution_id)))?;

    Ok(Json(history))
}

/// GET /executions/{user_id}?limit=
pub async fn list_executions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ExecutionListResponse>, ApiError> {
    debug!(user_id = %user_id, limit = ?query.limit, "Listing executions");

    let executions = state
        .chain_service
        .list_executions(&user_id, query.limit)
        .await?;

    Ok(Json(ExecutionListResponse::from(executions)))
}
