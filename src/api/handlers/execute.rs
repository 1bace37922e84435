//! Chain execution endpoints
//!
//! A run that reaches a terminal state always answers 200 with the
//! structured result, failed steps included. Errors are reserved for
//! chains rejected before any step ran.

use axum::extract::{Path, Query, State};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, UserQuery};
use crate::domain::chain::ChainRunResult;
use crate::infrastructure::services::{AdHocExecuteRequest, ExecuteChainRequest};

/// POST /execute/{chain_id}?userId=
pub async fn execute_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(request): Json<ExecuteChainRequest>,
) -> Result<Json<ChainRunResult>, ApiError> {
    let user_id = query.require()?;
    debug!(chain_id = %chain_id, user_id = %user_id, "Executing saved chain");

    let result = state
        .chain_service
        .execute(&chain_id, user_id, request)
        .await?;

    Ok(Json(result))
}

/// POST /execute
pub async fn execute_ad_hoc(
    State(state): State<AppState>,
    Json(request): Json<AdHocExecuteRequest>,
) -> Result<Json<ChainRunResult>, ApiError> {
    debug!(owner = %request.owner, name = %request.name, "Executing ad-hoc chain");

    let result = state.chain_service.execute_ad_hoc(request).await?;

    Ok(Json(result))
}
