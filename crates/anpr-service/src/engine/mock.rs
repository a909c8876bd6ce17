/// Fixed-output engines for tests and local development without models
use super::{Detection, PlateDetector, TextReading, TextRecognizer};
use anyhow::{anyhow, Result};
use image::{DynamicImage, GrayImage};
use std::sync::Mutex;

/// Detector that returns the same detections for every image
#[derive(Debug, Default)]
pub struct FixedDetector {
    detections: Vec<Detection>,
}

impl FixedDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl PlateDetector for FixedDetector {
    fn name(&self) -> &'static str {
        "mock_detector"
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}

/// Detector that always fails, to exercise degradation paths
#[derive(Debug, Default)]
pub struct FailingDetector;

impl PlateDetector for FailingDetector {
    fn name(&self) -> &'static str {
        "failing_detector"
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        Err(anyhow!("detector backend unavailable"))
    }
}

/// Recognizer that returns fixed readings and records the size of every
/// crop it was given
#[derive(Debug, Default)]
pub struct FixedRecognizer {
    readings: Vec<TextReading>,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl FixedRecognizer {
    pub fn new(readings: Vec<TextReading>) -> Self {
        Self {
            readings,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor from `(text, score)` pairs
    pub fn from_pairs(pairs: &[(&str, f32)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(text, score)| TextReading::new(*text, *score))
                .collect(),
        )
    }

    /// Dimensions of the crops passed to `recognize`, in call order
    pub fn seen_dimensions(&self) -> Vec<(u32, u32)> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl TextRecognizer for FixedRecognizer {
    fn name(&self) -> &'static str {
        "mock_ocr"
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<TextReading>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(image.dimensions());
        }
        Ok(self.readings.clone())
    }
}

/// Recognizer that always fails with a malformed-output error
#[derive(Debug, Default)]
pub struct FailingRecognizer;

impl TextRecognizer for FailingRecognizer {
    fn name(&self) -> &'static str {
        "mock_ocr"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<Vec<TextReading>> {
        Err(anyhow!("malformed recognizer output"))
    }
}
