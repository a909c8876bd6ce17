//! Single-image plate analysis: region selection, crop/enhance, text fusion
//! and coordinate normalization.
pub mod clahe;
pub mod enhance;
pub mod fusion;
pub mod geometry;
pub mod region;

use crate::engine::{Detection, Engines};
use crate::error::AnprError;
use common::plates::PlateResponse;
use enhance::{clamp_region, prepare_for_ocr, EnhanceParams};
use fusion::{read_plate_text, PlateGrammar};
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;
use std::time::Instant;
use telemetry::metrics::{ANPR_PLATE_GRAMMAR, ANPR_REGION_REJECTIONS, ANPR_STAGE_LATENCY};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Area scale in the region score `conf * (1 + area / normalizer)`
    pub area_normalizer: f64,

    pub enhance: EnhanceParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            area_normalizer: region::DEFAULT_AREA_NORMALIZER,
            enhance: EnhanceParams::default(),
        }
    }
}

/// Outcome of analysing one image
#[derive(Debug, Clone, PartialEq)]
pub struct PlateResult {
    pub text: String,
    pub confidence: f32,
    pub region: Option<Detection>,
    pub bbox_normalized: Option<[f64; 4]>,
    pub image_width: u32,
    pub image_height: u32,

    /// Grammar the text matched; not part of the response contract
    pub grammar: Option<PlateGrammar>,
}

impl PlateResult {
    /// No plate found in a `width` x `height` image
    pub fn no_plate(width: u32, height: u32) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            region: None,
            bbox_normalized: None,
            image_width: width,
            image_height: height,
            grammar: None,
        }
    }

    /// Wire form of the result
    pub fn to_response(&self, view_used: &str) -> PlateResponse {
        let Some(region) = self.region else {
            return PlateResponse::empty(self.image_width, self.image_height, view_used);
        };

        PlateResponse {
            plate: self.text.clone(),
            confidence: self.confidence,
            plate_model_conf: region.confidence,
            bbox: Some(region.bbox()),
            bbox_norm: self.bbox_normalized,
            image_w: self.image_width,
            image_h: self.image_height,
            view_used: view_used.to_string(),
        }
    }
}

/// Decode image bytes and apply the EXIF orientation, if any.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, AnprError> {
    if bytes.is_empty() {
        return Err(AnprError::invalid_input("empty image"));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AnprError::invalid_input(format!("failed to read image: {}", e)))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| AnprError::invalid_input(format!("unsupported image: {}", e)))?;
    let orientation = decoder
        .orientation()
        .map_err(|e| AnprError::invalid_input(format!("failed to read orientation: {}", e)))?;
    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| AnprError::invalid_input(format!("failed to decode image: {}", e)))?;
    image.apply_orientation(orientation);

    if image.width() == 0 || image.height() == 0 {
        return Err(AnprError::invalid_input("image has no pixels"));
    }

    Ok(image)
}

fn observe_stage(stage: &str, started: Instant) {
    ANPR_STAGE_LATENCY
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64());
}

/// The analysis pipeline bound to a pair of engines.
///
/// Every call is synchronous and self-contained; run it on a blocking thread
/// from async code.
#[derive(Debug, Clone)]
pub struct PlatePipeline {
    engines: Engines,
    config: PipelineConfig,
}

impl PlatePipeline {
    pub fn new(engines: Engines, config: PipelineConfig) -> Self {
        Self { engines, config }
    }

    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    /// Tag reported as `view_used` in responses
    pub fn view_tag(&self) -> &'static str {
        self.engines.recognizer.name()
    }

    /// Decode and analyse raw image bytes.
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<PlateResult, AnprError> {
        let started = Instant::now();
        let image = decode_image(bytes)?;
        observe_stage("decode", started);

        Ok(self.analyze_image(&image))
    }

    /// Analyse an already decoded, correctly oriented image.
    ///
    /// Engine failures and unusable regions degrade to an empty result.
    pub fn analyze_image(&self, image: &DynamicImage) -> PlateResult {
        let (width, height) = (image.width(), image.height());

        let started = Instant::now();
        let detections = match self.engines.detector.detect(image) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(
                    detector = self.engines.detector.name(),
                    error = %format!("{:#}", e),
                    "plate detection failed, treating as no detections"
                );
                Vec::new()
            }
        };
        observe_stage("detect", started);

        let Some(selected) = region::select_region(&detections, self.config.area_normalizer) else {
            tracing::debug!(width, height, "no plate detected");
            ANPR_PLATE_GRAMMAR.with_label_values(&["empty"]).inc();
            return PlateResult::no_plate(width, height);
        };

        let started = Instant::now();
        let enhanced = clamp_region(&selected, width, height).and_then(|region| {
            prepare_for_ocr(image, &region, &self.config.enhance).map(|crop| (region, crop))
        });
        let (region, crop) = match enhanced {
            Ok(enhanced) => enhanced,
            Err(e) => {
                tracing::warn!(bbox = ?selected.bbox(), error = %e, "discarding plate region");
                ANPR_REGION_REJECTIONS.inc();
                ANPR_PLATE_GRAMMAR.with_label_values(&["empty"]).inc();
                return PlateResult::no_plate(width, height);
            }
        };
        observe_stage("enhance", started);

        let started = Instant::now();
        let fused = read_plate_text(self.engines.recognizer.as_ref(), &crop);
        observe_stage("recognize", started);

        ANPR_PLATE_GRAMMAR
            .with_label_values(&[fused.grammar_label()])
            .inc();

        tracing::info!(
            plate = %fused.text,
            confidence = fused.confidence,
            region_confidence = region.confidence,
            grammar = fused.grammar_label(),
            candidates = fused.candidates,
            "plate analysed"
        );

        PlateResult {
            text: fused.text,
            confidence: fused.confidence,
            region: Some(region),
            bbox_normalized: Some(geometry::normalize_bbox(region.bbox(), width, height)),
            image_width: width,
            image_height: height,
            grammar: fused.grammar,
        }
    }
}
