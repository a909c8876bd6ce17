/// Plate text recognizer backed by a CRNN-style ONNX model with CTC output
///
/// The model takes a `[1, 1, height, width]` grayscale tensor and emits
/// `[1, timesteps, vocab + 1]` scores with the CTC blank at index 0.
use super::onnx::{create_session, OnnxOptions};
use super::{TextReading, TextRecognizer};
use crate::error::AnprError;
use anyhow::{Context, Result};
use image::{imageops, GrayImage};
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use std::path::PathBuf;
use std::sync::Mutex;

/// Tag reported in `view_used` for text read by this backend
pub const VIEW_TAG: &str = "onnx_ctc";

#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Path to the OCR ONNX model file
    pub model_path: PathBuf,

    /// OCR model input width
    pub input_width: u32,

    /// OCR model input height
    pub input_height: u32,

    /// Character vocabulary; index 0 of the model output is the CTC blank,
    /// so the first character here maps to output index 1
    pub char_vocab: String,

    /// Set when the model emits raw logits instead of probabilities
    pub output_logits: bool,

    /// Crops narrower than this width/height ratio are also read as two
    /// separate text rows (two-line motorcycle plates)
    pub two_row_aspect: f32,

    pub onnx: OnnxOptions,
}

fn default_input_width() -> u32 {
    200
}

fn default_input_height() -> u32 {
    64
}

fn default_char_vocab() -> String {
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string()
}

fn default_two_row_aspect() -> f32 {
    2.0
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/plate_ocr.onnx"),
            input_width: default_input_width(),
            input_height: default_input_height(),
            char_vocab: default_char_vocab(),
            output_logits: false,
            two_row_aspect: default_two_row_aspect(),
            onnx: OnnxOptions::default(),
        }
    }
}

/// Greedy CTC decoder over a fixed vocabulary
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    vocab: Vec<char>,
    output_logits: bool,
}

impl CtcDecoder {
    pub fn new(char_vocab: &str, output_logits: bool) -> Self {
        Self {
            vocab: char_vocab.chars().collect(),
            output_logits,
        }
    }

    /// Decode a `[1, T, V]` score tensor.
    ///
    /// Returns the text and the mean probability of the emitted characters,
    /// or `None` when only blanks were emitted.
    pub fn decode(&self, output: &Array<f32, IxDyn>) -> Result<Option<TextReading>, AnprError> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] < 1 || shape[2] < 2 {
            return Err(AnprError::recognition_failure(format!(
                "unexpected OCR output shape {:?}",
                shape
            )));
        }
        if shape[2] > self.vocab.len() + 1 {
            return Err(AnprError::recognition_failure(format!(
                "OCR output has {} classes but vocabulary has {} characters",
                shape[2],
                self.vocab.len()
            )));
        }

        let (timesteps, classes) = (shape[1], shape[2]);
        let mut text = String::new();
        let mut prob_sum = 0.0f32;
        let mut prev_idx = 0usize;

        for t in 0..timesteps {
            let mut best_idx = 0usize;
            let mut best = output[[0, t, 0]];
            for c in 1..classes {
                let value = output[[0, t, c]];
                if value > best {
                    best = value;
                    best_idx = c;
                }
            }

            // Skip blanks and collapse repeats
            if best_idx > 0 && best_idx != prev_idx {
                text.push(self.vocab[best_idx - 1]);
                prob_sum += self.probability(output, t, classes, best);
            }
            prev_idx = best_idx;
        }

        if text.is_empty() {
            return Ok(None);
        }

        let score = (prob_sum / text.chars().count() as f32).clamp(0.0, 1.0);
        Ok(Some(TextReading::new(text, score)))
    }

    /// Probability of the winning class at timestep `t`
    fn probability(&self, output: &Array<f32, IxDyn>, t: usize, classes: usize, best: f32) -> f32 {
        if !self.output_logits {
            return best;
        }
        let denom: f32 = (0..classes).map(|c| (output[[0, t, c]] - best).exp()).sum();
        1.0 / denom
    }
}

/// Split a crop into the text rows worth reading.
///
/// The whole crop is always read. Near-square crops are also read as top and
/// bottom halves.
pub fn text_rows(image: &GrayImage, two_row_aspect: f32) -> Vec<GrayImage> {
    let (width, height) = image.dimensions();
    let mut rows = vec![image.clone()];

    if height >= 2 && (width as f32) < two_row_aspect * height as f32 {
        let upper = height / 2;
        rows.push(imageops::crop_imm(image, 0, 0, width, upper).to_image());
        rows.push(imageops::crop_imm(image, 0, upper, width, height - upper).to_image());
    }

    rows
}

/// CTC text recognizer
pub struct CtcTextRecognizer {
    config: RecognizerConfig,
    decoder: CtcDecoder,
    session: Mutex<Session>,
    execution_provider: String,
}

impl CtcTextRecognizer {
    pub fn load(config: RecognizerConfig) -> Result<Self> {
        let (session, execution_provider) = create_session(&config.model_path, &config.onnx)
            .context("Failed to load text recognition model")?;

        tracing::info!(
            model = %config.model_path.display(),
            provider = %execution_provider,
            vocab_size = config.char_vocab.chars().count(),
            "initialized text recognizer"
        );

        Ok(Self {
            decoder: CtcDecoder::new(&config.char_vocab, config.output_logits),
            config,
            session: Mutex::new(session),
            execution_provider,
        })
    }

    fn preprocess(&self, img: &GrayImage) -> Array<f32, IxDyn> {
        let width = self.config.input_width;
        let height = self.config.input_height;
        let resized = imageops::resize(img, width, height, imageops::FilterType::Triangle);

        let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = f32::from(pixel[0]) / 255.0;
        }

        input
    }

    fn read_row(&self, row: &GrayImage) -> Result<Option<TextReading>> {
        let input_tensor = Value::from_array(self.preprocess(row))?;

        let inference_start = std::time::Instant::now();
        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock OCR session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        // Different OCR exports name their output differently
        let output_value = outputs
            .get("output")
            .or_else(|| outputs.get("output0"))
            .or_else(|| outputs.get("logits"))
            .context("No OCR output tensor found (tried: output, output0, logits)")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;
        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?;

        telemetry::metrics::ANPR_INFERENCE_TIME
            .with_label_values(&[self.name(), &self.execution_provider])
            .observe(inference_start.elapsed().as_secs_f64());

        Ok(self.decoder.decode(&output)?)
    }
}

impl TextRecognizer for CtcTextRecognizer {
    fn name(&self) -> &'static str {
        VIEW_TAG
    }

    fn execution_provider(&self) -> Option<String> {
        Some(self.execution_provider.clone())
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<TextReading>> {
        let mut readings = Vec::new();
        for row in text_rows(image, self.config.two_row_aspect) {
            if let Some(reading) = self.read_row(&row)? {
                readings.push(reading);
            }
        }
        Ok(readings)
    }
}
