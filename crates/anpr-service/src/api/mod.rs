pub mod routes;

use crate::state::AnprState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderName,
    routing::{get, post},
    Router,
};
use telemetry::{MakeRequestUuid, X_REQUEST_ID};
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Build the API router
pub fn router(state: AnprState) -> Router {
    let request_id = HeaderName::from_static(X_REQUEST_ID);
    let max_upload = state.max_upload_bytes();

    Router::new()
        .route("/", get(routes::root))
        // Analysis endpoints
        .route("/predict", post(routes::predict))
        .route("/v1/analyze", post(routes::analyze))
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}
