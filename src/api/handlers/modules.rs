//! Target service catalog

use axum::extract::{Path, State};

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, ModuleResponse, ModulesResponse};
use crate::domain::chain::TargetService;

fn describe(state: &AppState, service: TargetService) -> ModuleResponse {
    ModuleResponse {
        info: service.info(),
        configured: state.registry.is_configured(service),
    }
}

/// GET /modules
pub async fn list_modules(State(state): State<AppState>) -> Json<ModulesResponse> {
    let modules = TargetService::ALL
        .into_iter()
        .map(|service| describe(&state, service))
        .collect();

    Json(ModulesResponse { modules })
}

/// GET /modules/{name}
pub async fn get_module(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ModuleResponse>, ApiError> {
    let service: TargetService = name
        .parse()
        .map_err(|_| ApiError::not_found(format!("Module '{}' not found", name)))?;

    Ok(Json(describe(&state, service)))
}
