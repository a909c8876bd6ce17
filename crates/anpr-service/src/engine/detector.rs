/// License plate detector backed by a single-class YOLOv8 ONNX export
///
/// The model is expected to emit `[batch, 4 + classes, predictions]` with box
/// centres and sizes in model-input pixels, as produced by the Ultralytics
/// ONNX exporter.
use super::onnx::{create_session, OnnxOptions};
use super::{Detection, PlateDetector};
use anyhow::{bail, Context, Result};
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to the plate detection ONNX model file
    pub model_path: PathBuf,

    /// Minimum confidence for a prediction to be considered at all
    pub confidence_threshold: f32,

    /// IoU threshold for NMS
    pub iou_threshold: f32,

    /// Maximum number of plates kept after NMS
    pub max_detections: usize,

    /// Model input size (width and height)
    pub input_size: u32,

    pub onnx: OnnxOptions,
}

fn default_confidence() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    10
}

fn default_input_size() -> u32 {
    640
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/plate_detector.onnx"),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
            onnx: OnnxOptions::default(),
        }
    }
}

/// YOLOv8 plate detector
pub struct YoloPlateDetector {
    config: DetectorConfig,
    session: Mutex<Session>,
    execution_provider: String,
}

impl YoloPlateDetector {
    pub fn load(config: DetectorConfig) -> Result<Self> {
        let (session, execution_provider) = create_session(&config.model_path, &config.onnx)
            .context("Failed to load plate detection model")?;

        tracing::info!(
            model = %config.model_path.display(),
            provider = %execution_provider,
            confidence = config.confidence_threshold,
            input_size = config.input_size,
            "initialized plate detector"
        );

        Ok(Self {
            config,
            session: Mutex::new(session),
            execution_provider,
        })
    }

    /// Resize to the model input and convert to normalized NCHW
    fn preprocess(&self, img: &DynamicImage) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let rgb_img = img
            .resize_exact(size, size, image::imageops::FilterType::Triangle)
            .to_rgb8();

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
        for (x, y, pixel) in rgb_img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                input[[0, channel, y, x]] = f32::from(pixel[channel]) / 255.0;
            }
        }

        input
    }
}

/// Intersection over union of two corner-form boxes
pub(crate) fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let intersection = if ix2 > ix1 && iy2 > iy1 {
        f64::from(ix2 - ix1) * f64::from(iy2 - iy1)
    } else {
        0.0
    };

    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        (intersection / union) as f32
    } else {
        0.0
    }
}

/// Greedy non-maximum suppression, highest confidence first
pub(crate) fn nms(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Decode raw YOLOv8 output into image-space detections.
///
/// Boxes are rescaled from the square model input to the source image and
/// clamped to its bounds; boxes that collapse are dropped.
pub(crate) fn decode_predictions(
    output: &Array<f32, IxDyn>,
    config: &DetectorConfig,
    image_width: u32,
    image_height: u32,
) -> Result<Vec<Detection>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        bail!("unexpected detector output shape {:?}", shape);
    }

    let channels = shape[1];
    let num_predictions = shape[2];
    let scale_x = image_width as f32 / config.input_size as f32;
    let scale_y = image_height as f32 / config.input_size as f32;
    let max_x = image_width as f32;
    let max_y = image_height as f32;

    let mut boxes = Vec::new();
    for i in 0..num_predictions {
        // Single-class exports have exactly one score row; take the best otherwise
        let confidence = (4..channels)
            .map(|c| output[[0, c, i]])
            .fold(f32::MIN, f32::max);
        if confidence < config.confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, max_x).round() as i32;
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, max_y).round() as i32;
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, max_x).round() as i32;
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, max_y).round() as i32;

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        boxes.push(Detection::new(x1, y1, x2, y2, confidence.clamp(0.0, 1.0)));
    }

    let mut kept = nms(boxes, config.iou_threshold);
    kept.truncate(config.max_detections);
    Ok(kept)
}

impl PlateDetector for YoloPlateDetector {
    fn name(&self) -> &'static str {
        "yolov8_plate"
    }

    fn execution_provider(&self) -> Option<String> {
        Some(self.execution_provider.clone())
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let input_tensor = Value::from_array(self.preprocess(image))?;

        let inference_start = std::time::Instant::now();
        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock detection session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let inference_time = inference_start.elapsed();

        let output_value = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .context("No detection output tensor found (tried: output0, output)")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;
        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?;

        telemetry::metrics::ANPR_INFERENCE_TIME
            .with_label_values(&[self.name(), &self.execution_provider])
            .observe(inference_time.as_secs_f64());

        let detections = decode_predictions(&output, &self.config, image.width(), image.height())?;
        tracing::debug!(
            count = detections.len(),
            inference_ms = inference_time.as_millis() as u64,
            "plate detection finished"
        );

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[1, 5, n]` output from (cx, cy, w, h, conf) rows
    fn yolo_output(predictions: &[[f32; 5]]) -> Array<f32, IxDyn> {
        let n = predictions.len();
        let mut output = Array::zeros(IxDyn(&[1, 5, n]));
        for (i, p) in predictions.iter().enumerate() {
            for (c, value) in p.iter().enumerate() {
                output[[0, c, i]] = *value;
            }
        }
        output
    }

    #[test]
    fn test_config_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.max_detections, 10);
        assert_eq!(config.input_size, 640);
    }

    #[test]
    fn test_iou() {
        let a = Detection::new(10, 10, 60, 30, 0.9);
        let b = Detection::new(30, 15, 80, 35, 0.8);
        let value = iou(&a, &b);
        assert!(value > 0.0 && value < 1.0);

        assert!((iou(&a, &a) - 1.0).abs() < 0.001);

        let far = Detection::new(100, 100, 150, 120, 0.7);
        assert_eq!(iou(&a, &far), 0.0);
    }

    #[test]
    fn test_nms() {
        let boxes = vec![
            Detection::new(10, 10, 110, 40, 0.8),
            Detection::new(12, 11, 112, 41, 0.9),
            Detection::new(200, 200, 300, 230, 0.85),
        ];

        let kept = nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.85);
    }

    #[test]
    fn test_decode_scales_to_image() {
        let config = DetectorConfig::default();
        // Centre of a 640x640 input, box 64x32
        let output = yolo_output(&[[320.0, 320.0, 64.0, 32.0, 0.9]]);

        let detections = decode_predictions(&output, &config, 1280, 960).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox(), [576, 456, 704, 504]);
        assert_eq!(detections[0].confidence, 0.9);
    }

    #[test]
    fn test_decode_filters_low_confidence() {
        let config = DetectorConfig::default();
        let output = yolo_output(&[
            [100.0, 100.0, 50.0, 20.0, 0.1],
            [400.0, 400.0, 50.0, 20.0, 0.3],
        ]);

        let detections = decode_predictions(&output, &config, 640, 640).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.3);
    }

    #[test]
    fn test_decode_clamps_to_image_bounds() {
        let config = DetectorConfig::default();
        let output = yolo_output(&[[630.0, 5.0, 40.0, 20.0, 0.8]]);

        let detections = decode_predictions(&output, &config, 640, 640).unwrap();
        assert_eq!(detections.len(), 1);
        let d = detections[0];
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (610, 0, 640, 15));
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let config = DetectorConfig::default();
        let output = Array::zeros(IxDyn(&[1, 3]));
        assert!(decode_predictions(&output, &config, 640, 640).is_err());
    }
}
