use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::error;

use super::{EvaluateRequest, EvaluateResponse, FeaturesRequest, FeaturesResponse};
use crate::error::StoreError;
use crate::state::AppState;

// A store outage must not look like a "disabled" answer, so it gets its own
// status and callers decide how to fall back.
fn unavailable(e: StoreError) -> (StatusCode, String) {
    error!(error = %e, "flag store unavailable during evaluation");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Flag store unavailable".to_string(),
    )
}

/// Evaluate a single flag for the given context
pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let evaluation = state
        .engine
        .explain(&request.flag_key, &request.context)
        .await
        .map_err(unavailable)?;

    Ok(Json(EvaluateResponse {
        flag_key: request.flag_key,
        enabled: evaluation.enabled,
        reason: evaluation.reason,
    }))
}

/// List every flag that is on for the given context
pub async fn features(
    State(state): State<AppState>,
    Json(request): Json<FeaturesRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let flags = state
        .engine
        .enabled_features(&request.context)
        .await
        .map_err(unavailable)?;

    Ok(Json(FeaturesResponse { flags }))
}
