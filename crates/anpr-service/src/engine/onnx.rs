//! ONNX Runtime session setup shared by the detector and recognizer.
use anyhow::{bail, Context, Result};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};
use std::path::Path;

/// Runtime options common to every model the service loads
#[derive(Debug, Clone)]
pub struct OnnxOptions {
    /// Execution provider preference (CPU, CUDA, TensorRT)
    pub execution_provider: String,

    /// GPU device ID (0, 1, 2, etc.)
    pub device_id: i32,

    /// Number of intra-operation threads
    pub intra_threads: usize,

    /// Number of inter-operation threads
    pub inter_threads: usize,
}

fn default_execution_provider() -> String {
    "CPU".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for OnnxOptions {
    fn default() -> Self {
        Self {
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    TensorRt,
    Cuda,
    Cpu,
}

impl Provider {
    fn label(self) -> &'static str {
        match self {
            Provider::TensorRt => "TensorRT",
            Provider::Cuda => "CUDA",
            Provider::Cpu => "CPU",
        }
    }
}

/// Providers to try, best first. CPU is always the last resort.
fn fallback_chain(preference: &str) -> &'static [Provider] {
    match preference.to_uppercase().as_str() {
        "TENSORRT" => &[Provider::TensorRt, Provider::Cuda, Provider::Cpu],
        "CUDA" => &[Provider::Cuda, Provider::Cpu],
        _ => &[Provider::Cpu],
    }
}

fn base_builder(options: &OnnxOptions) -> Result<SessionBuilder> {
    Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(options.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(options.inter_threads)
        .context("Failed to set inter threads")
}

fn build_session(model_path: &Path, provider: Provider, options: &OnnxOptions) -> Result<Session> {
    let builder = base_builder(options)?;
    let builder = match provider {
        Provider::TensorRt => builder
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ])
            .context("Failed to set execution providers")?,
        Provider::Cuda => builder
            .with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ])
            .context("Failed to set execution providers")?,
        Provider::Cpu => builder,
    };

    builder
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))
}

/// Create an ONNX session, walking down the provider fallback chain.
///
/// Returns the session together with the label of the provider in use.
pub fn create_session(model_path: &Path, options: &OnnxOptions) -> Result<(Session, String)> {
    if !model_path.is_file() {
        bail!("model file not found: {}", model_path.display());
    }

    let chain = fallback_chain(&options.execution_provider);
    let mut last_error = None;

    for provider in chain {
        tracing::info!(
            model = %model_path.display(),
            provider = provider.label(),
            device_id = options.device_id,
            "creating ONNX session"
        );
        match build_session(model_path, *provider, options) {
            Ok(session) => return Ok((session, provider.label().to_string())),
            Err(e) => {
                tracing::warn!(
                    model = %model_path.display(),
                    provider = provider.label(),
                    "execution provider failed: {:#}",
                    e
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no execution provider available")))
}
