use axum::extract::State;
use axum::response::Json;
use obm_merger::{BundleStatus, PreMergedRequest, PreMergedResponse, QueryService};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Summary of the bundle being accumulated.
pub async fn status_handler(State(query): State<QueryService>) -> Json<BundleStatus> {
    Json(query.status())
}

/// Blocks already held by the live bundle. A miss is `found: false`, not an
/// HTTP error.
pub async fn premerged_handler(
    State(query): State<QueryService>,
    Json(request): Json<PreMergedRequest>,
) -> Json<PreMergedResponse> {
    let response = query.pre_merged_blocks(&request);
    tracing::debug!(
        low = request.low_block_num,
        high = %request.high_block_id,
        found = response.found,
        blocks = response.blocks.len(),
        "premerged query"
    );
    Json(response)
}
