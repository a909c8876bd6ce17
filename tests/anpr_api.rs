/// Integration tests for the ANPR HTTP API
use anpr_service::{
    api,
    engine::{
        mock::{FailingRecognizer, FixedDetector, FixedRecognizer},
        Detection, Engines, PlateDetector, TextRecognizer,
    },
    AnprState, PipelineConfig,
};
use axum::http::{HeaderName, HeaderValue};
use axum_test::{
    multipart::{MultipartForm, Part},
    TestServer,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use common::plates::{ErrorResponse, PlateResponse, ReadinessResponse};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Detector that takes longer than any sane request timeout
struct SlowDetector(Duration);

impl PlateDetector for SlowDetector {
    fn name(&self) -> &'static str {
        "slow_detector"
    }

    fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        std::thread::sleep(self.0);
        Ok(Vec::new())
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 77])
    }));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn server_with(
    detector: impl PlateDetector + 'static,
    recognizer: impl TextRecognizer + 'static,
) -> TestServer {
    let engines = Engines::new(Arc::new(detector), Arc::new(recognizer));
    let state = AnprState::new(engines, PipelineConfig::default());
    TestServer::new(api::router(state)).unwrap()
}

fn plate_server() -> TestServer {
    server_with(
        FixedDetector::new(vec![Detection::new(200, 300, 400, 360, 0.87)]),
        FixedRecognizer::from_pairs(&[("abc-1234", 0.93), ("BR", 0.4)]),
    )
}

fn file_form(bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes).file_name("car.png").mime_type("image/png"),
    )
}

#[tokio::test]
async fn test_root() {
    let response = plate_server().get("/").await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "ANPR API online");
}

#[tokio::test]
async fn test_predict_multipart() {
    let response = plate_server()
        .post("/predict")
        .multipart(file_form(png(800, 600)))
        .await;

    assert_eq!(response.status_code(), 200);
    let plate: PlateResponse = response.json();
    assert_eq!(plate.plate, "ABC1234");
    assert_eq!(plate.confidence, 0.93);
    assert_eq!(plate.plate_model_conf, 0.87);
    assert_eq!(plate.bbox, Some([200, 300, 400, 360]));
    assert_eq!(plate.bbox_norm, Some([0.25, 0.5, 0.5, 0.6]));
    assert_eq!((plate.image_w, plate.image_h), (800, 600));
    assert_eq!(plate.view_used, "mock_ocr");
}

#[tokio::test]
async fn test_predict_without_plate() {
    let server = server_with(
        FixedDetector::empty(),
        FixedRecognizer::from_pairs(&[("ABC1234", 0.9)]),
    );

    let response = server.post("/predict").multipart(file_form(png(320, 240))).await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["plate"], "");
    assert_eq!(body["confidence"], 0.0);
    assert_eq!(body["plate_model_conf"], 0.0);
    assert!(body["bbox"].is_null());
    assert!(body["bbox_norm"].is_null());
    assert_eq!(body["image_w"], 320);
    assert_eq!(body["image_h"], 240);
}

#[tokio::test]
async fn test_predict_unreadable_plate() {
    let server = server_with(
        FixedDetector::new(vec![Detection::new(10, 10, 90, 40, 0.6)]),
        FailingRecognizer,
    );

    let response = server.post("/predict").multipart(file_form(png(100, 100))).await;

    assert_eq!(response.status_code(), 200);
    let plate: PlateResponse = response.json();
    assert_eq!(plate.plate, "");
    assert_eq!(plate.confidence, 0.0);
    assert_eq!(plate.bbox, Some([10, 10, 90, 40]));
}

#[tokio::test]
async fn test_predict_rejects_empty_file() {
    let response = plate_server().post("/predict").multipart(file_form(Vec::new())).await;

    assert_eq!(response.status_code(), 400);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "invalid_input");
}

#[tokio::test]
async fn test_predict_rejects_garbage() {
    let response = plate_server()
        .post("/predict")
        .multipart(file_form(b"GIF89a but not really".to_vec()))
        .await;

    assert_eq!(response.status_code(), 400);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "invalid_input");
}

#[tokio::test]
async fn test_predict_requires_file_field() {
    let form = MultipartForm::new().add_text("image", "nothing here");
    let response = plate_server().post("/predict").multipart(form).await;

    assert_eq!(response.status_code(), 400);
    let error: ErrorResponse = response.json();
    assert!(error.error.contains("file"));
}

#[tokio::test]
async fn test_analyze_base64() {
    let body = serde_json::json!({ "data": BASE64_STANDARD.encode(png(800, 600)) });
    let response = plate_server().post("/v1/analyze").json(&body).await;

    assert_eq!(response.status_code(), 200);
    let plate: PlateResponse = response.json();
    assert_eq!(plate.plate, "ABC1234");
    assert_eq!(plate.bbox, Some([200, 300, 400, 360]));
}

#[tokio::test]
async fn test_analyze_rejects_bad_base64() {
    let body = serde_json::json!({ "data": "***not base64***" });
    let response = plate_server().post("/v1/analyze").json(&body).await;

    assert_eq!(response.status_code(), 400);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "invalid_input");
}

#[tokio::test]
async fn test_analyze_rejects_missing_data() {
    let body = serde_json::json!({ "image": "" });
    let response = plate_server().post("/v1/analyze").json(&body).await;

    assert_eq!(response.status_code(), 400);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "invalid_input");
}

#[tokio::test]
async fn test_analysis_timeout() {
    let engines = Engines::new(
        Arc::new(SlowDetector(Duration::from_millis(500))),
        Arc::new(FixedRecognizer::from_pairs(&[])),
    );
    let state = AnprState::with_limits(
        engines,
        PipelineConfig::default(),
        Duration::from_millis(50),
        1024 * 1024,
    );
    let server = TestServer::new(api::router(state)).unwrap();

    let response = server.post("/predict").multipart(file_form(png(64, 64))).await;

    assert_eq!(response.status_code(), 504);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "timeout");
}

#[tokio::test]
async fn test_upload_limit() {
    let engines = Engines::new(
        Arc::new(FixedDetector::empty()),
        Arc::new(FixedRecognizer::from_pairs(&[])),
    );
    let state = AnprState::with_limits(
        engines,
        PipelineConfig::default(),
        Duration::from_secs(5),
        256,
    );
    let server = TestServer::new(api::router(state)).unwrap();

    let body = serde_json::json!({ "data": "A".repeat(4096) });
    let response = server.post("/v1/analyze").json(&body).await;

    assert_eq!(response.status_code(), 413);
}

#[tokio::test]
async fn test_health_and_readiness() {
    let server = plate_server();

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), 200);

    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), 200);
    let readiness: ReadinessResponse = response.json();
    assert_eq!(readiness.status, "ready");
    assert_eq!(readiness.detector.name, "mock_detector");
    assert_eq!(readiness.recognizer.name, "mock_ocr");
    assert!(readiness.detector.ready && readiness.recognizer.ready);
}

#[tokio::test]
async fn test_request_id_propagated() {
    let server = plate_server();

    let request_id = HeaderName::from_static("x-request-id");

    let response = server.get("/healthz").await;
    let generated = response.header(request_id.clone());
    assert!(!generated.is_empty());

    let response = server
        .get("/healthz")
        .add_header(request_id.clone(), HeaderValue::from_static("plate-req-42"))
        .await;
    assert_eq!(response.header(request_id), "plate-req-42");
}

#[tokio::test]
async fn test_metrics_after_analysis() {
    let server = plate_server();
    server.post("/predict").multipart(file_form(png(800, 600))).await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);
    let text = response.text();
    assert!(text.contains("anpr_requests_total"));
    assert!(text.contains("anpr_stage_latency_seconds"));
    assert!(text.contains("anpr_plate_grammar_total"));
}
