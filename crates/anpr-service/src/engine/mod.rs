//! Inference backends behind two narrow traits.
//!
//! The pipeline only sees [`PlateDetector`] and [`TextRecognizer`]; the ONNX
//! implementations live in [`detector`] and [`recognizer`], and [`mock`]
//! provides fixed-output engines for tests.

pub mod detector;
pub mod mock;
pub mod onnx;
pub mod recognizer;

use anyhow::Result;
use image::{DynamicImage, GrayImage};
use std::sync::Arc;

/// One candidate plate location produced by a detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,

    /// Detector confidence (0.0 to 1.0)
    pub confidence: f32,
}

impl Detection {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    /// Box area in pixels; inverted boxes count as zero
    pub fn area(&self) -> f64 {
        let w = (i64::from(self.x2) - i64::from(self.x1)).max(0);
        let h = (i64::from(self.y2) - i64::from(self.y1)).max(0);
        (w * h) as f64
    }

    pub fn bbox(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// One raw (text, score) hypothesis from a recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct TextReading {
    pub text: String,
    pub score: f32,
}

impl TextReading {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Locates license plates in a full image
pub trait PlateDetector: Send + Sync {
    /// Backend identifier (e.g. "yolov8_plate")
    fn name(&self) -> &'static str;

    /// Execution provider actually in use, when the backend has one
    fn execution_provider(&self) -> Option<String> {
        None
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// Reads text from an enhanced, single-channel plate crop
pub trait TextRecognizer: Send + Sync {
    /// Tag reported to clients in `view_used`
    fn name(&self) -> &'static str;

    fn execution_provider(&self) -> Option<String> {
        None
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<TextReading>>;
}

/// The detector/recognizer pair, loaded once at startup and shared read-only
/// by every request.
#[derive(Clone)]
pub struct Engines {
    pub detector: Arc<dyn PlateDetector>,
    pub recognizer: Arc<dyn TextRecognizer>,
}

impl Engines {
    pub fn new(detector: Arc<dyn PlateDetector>, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            detector,
            recognizer,
        }
    }
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines")
            .field("detector", &self.detector.name())
            .field("recognizer", &self.recognizer.name())
            .finish()
    }
}
