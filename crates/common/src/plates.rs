//! Plate analysis contracts for the ANPR HTTP API.
//!
//! These types are the wire format shared between the service and its
//! clients. Field names are part of the public contract and must not change.

use serde::{Deserialize, Serialize};

/// Result of analysing a single photo.
///
/// An empty `plate` with `bbox == None` is a successful analysis that found
/// nothing, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateResponse {
    /// Recognised plate text (uppercase alphanumeric), possibly empty
    pub plate: String,

    /// Text recognition confidence (0.0 to 1.0)
    pub confidence: f32,

    /// Plate detector confidence for the selected region (0.0 to 1.0)
    pub plate_model_conf: f32,

    /// Selected plate box in source pixels `[x1, y1, x2, y2]`
    pub bbox: Option<[i32; 4]>,

    /// Selected plate box as fractions of the image size
    pub bbox_norm: Option<[f64; 4]>,

    /// Source image width in pixels (after orientation correction)
    pub image_w: u32,

    /// Source image height in pixels (after orientation correction)
    pub image_h: u32,

    /// Tag of the recognition backend that produced `plate`
    pub view_used: String,
}

impl PlateResponse {
    /// Response for an image in which no plate was detected.
    pub fn empty(image_w: u32, image_h: u32, view_used: impl Into<String>) -> Self {
        Self {
            plate: String::new(),
            confidence: 0.0,
            plate_model_conf: 0.0,
            bbox: None,
            bbox_norm: None,
            image_w,
            image_h,
            view_used: view_used.into(),
        }
    }

    pub fn has_plate(&self) -> bool {
        !self.plate.is_empty()
    }
}

/// JSON request body for `POST /v1/analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Image bytes (base64 encoded for JSON transport)
    pub data: String,
}

/// Error body returned for failed requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    /// Machine-readable error kind (e.g. "invalid_input")
    pub kind: String,
}

/// Readiness report for `GET /readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub detector: EngineStatus,
    pub recognizer: EngineStatus,
}

/// Status of one loaded inference engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub name: String,
    pub ready: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_provider: Option<String>,
}
