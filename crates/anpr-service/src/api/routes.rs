use crate::error::AnprError;
use crate::state::AnprState;
use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use common::plates::{AnalyzeRequest, PlateResponse};
use serde_json::json;

/// Multipart field carrying the uploaded photo
const FILE_FIELD: &str = "file";

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "ANPR API online"
    }))
}

/// Analyse a photo uploaded as multipart form field `file`
pub async fn predict(
    State(state): State<AnprState>,
    mut multipart: Multipart,
) -> Result<Json<PlateResponse>, AnprError> {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AnprError::invalid_input(format!("malformed multipart body: {}", e)))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AnprError::invalid_input(format!("failed to read upload: {}", e)))?;
            image = Some(bytes);
            break;
        }
    }

    let Some(bytes) = image else {
        return Err(AnprError::invalid_input("missing multipart field 'file'"));
    };

    tracing::debug!(size = bytes.len(), "received multipart upload");
    let response = state.analyze("predict", bytes.to_vec()).await?;
    Ok(Json(response))
}

/// Analyse a base64 encoded photo sent as JSON
pub async fn analyze(
    State(state): State<AnprState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<PlateResponse>, AnprError> {
    let Json(request) =
        payload.map_err(|e| AnprError::invalid_input(format!("invalid request body: {}", e)))?;

    let bytes = BASE64_STANDARD
        .decode(request.data.trim())
        .map_err(|e| AnprError::invalid_input(format!("invalid base64 image: {}", e)))?;

    let response = state.analyze("analyze", bytes).await?;
    Ok(Json(response))
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "anpr-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<AnprState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.readiness()))
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
