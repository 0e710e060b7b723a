use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthData {
    status: u16,
    cache_enabled: bool,
    invalidation_queue: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthData> {
    Json(HealthData {
        status: StatusCode::OK.as_u16(),
        cache_enabled: state.engine.cache().is_enabled(),
        invalidation_queue: state.invalidations.is_some(),
    })
}
