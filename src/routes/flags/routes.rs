use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{error, warn};

use super::FlagResponse;
use crate::state::AppState;

/// List all flag definitions
pub async fn list(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let flags = state.store.fetch_all().await.map_err(|e| {
        error!(error = %e, "failed to list flags");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Failed to fetch flags".to_string(),
        )
    })?;

    let response: Vec<FlagResponse> = flags.into_iter().map(FlagResponse::from).collect();
    Ok(Json(response))
}

/// Drop a flag from this instance's cache and tell the other instances
pub async fn invalidate(
    State(state): State<AppState>,
    Path(flag_key): Path<String>,
) -> impl IntoResponse {
    state.engine.cache().invalidate(&flag_key);

    if let Some(queue) = &state.invalidations {
        // Best effort: the other instances still converge on their TTL.
        if let Err(e) = queue.publish(&flag_key).await {
            warn!(flag_key = %flag_key, error = %e, "failed to publish flag invalidation");
        }
    }

    StatusCode::NO_CONTENT
}
