use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod flags;
mod health;
mod sdk;

pub use health::health;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let flag_router = Router::new()
        .route("/", get(flags::routes::list))
        .route("/{flag_key}/invalidate", post(flags::routes::invalidate));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(
            "/api",
            Router::new()
                .route("/evaluate", post(sdk::routes::evaluate))
                .route("/features", post(sdk::routes::features))
                .nest("/flags", flag_router),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> &'static str {
    "Feature flag evaluation service"
}
