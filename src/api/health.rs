//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::api::types::Json;
use crate::domain::chain::TargetService;

use super::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Per-target-service configuration check
#[derive(Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Returns 200 while the process is running
pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: None,
    };

    (StatusCode::OK, Json(response))
}

/// Reports which target services have a base URL
///
/// Missing services degrade the status but never fail the probe; chains
/// that do not use them still run.
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let checks: Vec<HealthCheck> = TargetService::ALL
        .into_iter()
        .map(|service| {
            if state.registry.is_configured(service) {
                HealthCheck {
                    name: service.as_str().to_string(),
                    status: HealthStatus::Healthy,
                    message: None,
                }
            } else {
                HealthCheck {
                    name: service.as_str().to_string(),
                    status: HealthStatus::Degraded,
                    message: Some("No base URL configured".to_string()),
                }
            }
        })
        .collect();

    let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: Some(checks),
    };

    (StatusCode::OK, Json(response))
}

pub async fn live_check() -> impl IntoResponse {
    StatusCode::OK
}
