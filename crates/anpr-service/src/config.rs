use crate::engine::detector::DetectorConfig;
use crate::engine::onnx::OnnxOptions;
use crate::engine::recognizer::RecognizerConfig;
use crate::pipeline::PipelineConfig;
use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;
use std::{env, net::SocketAddr, path::PathBuf};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AnprServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,

    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    pub pipeline: PipelineConfig,

    /// Upper bound on a single analysis, after which the caller gets a 504
    pub request_timeout: Duration,

    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl AnprServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("ANPR_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_addr: SocketAddr = bind.parse().context("invalid ANPR_ADDR")?;

        let onnx = OnnxOptions {
            execution_provider: lookup("ANPR_EXECUTION_PROVIDER").unwrap_or_else(|| "CPU".to_string()),
            device_id: parse_var(&lookup, "ANPR_DEVICE_ID", 0)?,
            ..OnnxOptions::default()
        };

        let mut detector = DetectorConfig {
            onnx: onnx.clone(),
            ..DetectorConfig::default()
        };
        if let Some(path) = lookup("PLATE_MODEL_PATH") {
            detector.model_path = PathBuf::from(path);
        }
        detector.confidence_threshold =
            parse_var(&lookup, "DETECTION_CONFIDENCE", detector.confidence_threshold)?;
        if !(0.0..=1.0).contains(&detector.confidence_threshold) {
            bail!("DETECTION_CONFIDENCE must be between 0 and 1");
        }

        let mut recognizer = RecognizerConfig {
            onnx,
            ..RecognizerConfig::default()
        };
        if let Some(path) = lookup("OCR_MODEL_PATH") {
            recognizer.model_path = PathBuf::from(path);
        }
        if let Some(vocab) = lookup("OCR_CHAR_VOCAB") {
            if vocab.is_empty() {
                bail!("OCR_CHAR_VOCAB must not be empty");
            }
            recognizer.char_vocab = vocab;
        }

        let mut pipeline = PipelineConfig::default();
        pipeline.area_normalizer = parse_var(&lookup, "AREA_NORMALIZER", pipeline.area_normalizer)?;
        if !pipeline.area_normalizer.is_finite() || pipeline.area_normalizer <= 0.0 {
            bail!("AREA_NORMALIZER must be positive");
        }

        let enhance = &mut pipeline.enhance;
        enhance.padding = parse_var(&lookup, "CROP_PADDING", enhance.padding)?;
        enhance.upscale_min_width =
            parse_var(&lookup, "UPSCALE_MIN_WIDTH", enhance.upscale_min_width)?;
        enhance.upscale_factor = parse_var(&lookup, "UPSCALE_FACTOR", enhance.upscale_factor)?;
        if !enhance.upscale_factor.is_finite() || enhance.upscale_factor <= 0.0 {
            bail!("UPSCALE_FACTOR must be positive");
        }
        enhance.clahe.clip_limit = parse_var(&lookup, "CLAHE_CLIP_LIMIT", enhance.clahe.clip_limit)?;
        if !enhance.clahe.clip_limit.is_finite() || enhance.clahe.clip_limit < 0.0 {
            bail!("CLAHE_CLIP_LIMIT must not be negative");
        }
        let tiles: u32 = parse_var(&lookup, "CLAHE_TILES", enhance.clahe.tiles_x)?;
        if tiles == 0 {
            bail!("CLAHE_TILES must be at least 1");
        }
        enhance.clahe.tiles_x = tiles;
        enhance.clahe.tiles_y = tiles;

        let timeout_secs: u64 = parse_var(&lookup, "ANPR_REQUEST_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            bail!("ANPR_REQUEST_TIMEOUT_SECS must be at least 1");
        }

        let max_upload_bytes = parse_var(&lookup, "ANPR_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Self {
            bind_addr,
            detector,
            recognizer,
            pipeline,
            request_timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes,
        })
    }
}

/// Parse `key` when set, falling back to `default` when it is not.
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {}: {:?}", key, value)),
        None => Ok(default),
    }
}
