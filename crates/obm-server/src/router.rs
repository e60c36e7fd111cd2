use axum::routing::{get, post};
use axum::Router;
use obm_merger::QueryService;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Build the axum router with all query endpoints.
pub fn build_router(query: QueryService) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/status", get(handler::status_handler))
        .route("/v1/premerged", post(handler::premerged_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(query)
}
