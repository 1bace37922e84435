//! Chain controller endpoints

pub mod chains;
pub mod execute;
pub mod executions;
pub mod modules;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create the chain controller router
pub fn create_chain_router() -> Router<AppState> {
    Router::new()
        // Chain configuration
        .route("/chain", post(chains::create_chain))
        .route(
            "/chain/{chain_id}",
            get(chains::get_chain)
                .patch(chains::update_chain)
                .delete(chains::delete_chain),
        )
        .route("/chains/{user_id}", get(chains::list_chains))
        // Execution
        .route("/execute", post(execute::execute_ad_hoc))
        .route("/execute/{chain_id}", post(execute::execute_chain))
        // History
        .route("/execution/{execution_id}", get(executions::get_execution))
        .route("/executions/{user_id}", get(executions::list_executions))
        // Target service catalog
        .route("/modules", get(modules::list_modules))
        .route("/modules/{name}", get(modules::get_module))
}
