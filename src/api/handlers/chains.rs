//! Chain configuration endpoints

use axum::extract::{Path, Query, State};
use serde_json::Value;
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, ChainListResponse, DeleteResponse, Json, UserQuery};
use crate::domain::chain::ChainConfiguration;
use crate::infrastructure::services::CreateChainRequest;

/// POST /chain
pub async fn create_chain(
    State(state): State<AppState>,
    Json(request): Json<CreateChainRequest>,
) -> Result<Json<ChainConfiguration>, ApiError> {
    debug!(user_id = %request.user_id, name = %request.name, "Creating chain");

    let chain = state.chain_service.create(request).await?;

    Ok(Json(chain))
}

/// GET /chain/{chain_id}?userId=
pub async fn get_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ChainConfiguration>, ApiError> {
    let user_id = query.require()?;
    debug!(chain_id = %chain_id, user_id = %user_id, "Getting chain");

    let chain = state
        .chain_service
        .get(&chain_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Chain '{}' not found", chain_id)))?;

    Ok(Json(chain))
}

/// GET /chains/{user_id}
pub async fn list_chains(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ChainListResponse>, ApiError> {
    debug!(user_id = %user_id, "Listing chains");

    let chains = state.chain_service.list(&user_id).await?;

    Ok(Json(ChainListResponse::from(chains)))
}

/// PATCH /chain/{chain_id}?userId=
pub async fn update_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(patch): Json<Value>,
) -> Result<Json<ChainConfiguration>, ApiError> {
    let user_id = query.require()?;
    debug!(chain_id = %chain_id, user_id = %user_id, "Updating chain");

    let chain = state.chain_service.update(&chain_id, user_id, patch).await?;

    Ok(Json(chain))
}

/// DELETE /chain/{chain_id}?userId=
pub async fn delete_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let user_id = query.require()?;
    debug!(chain_id = %chain_id, user_id = %user_id, "Deleting chain");

    if !state.chain_service.delete(&chain_id, user_id).await? {
        return Err(ApiError::not_found(format!("Chain '{}' not found", chain_id)));
    }

    Ok(Json(DeleteResponse {
        id: chain_id,
        deleted: true,
    }))
}
