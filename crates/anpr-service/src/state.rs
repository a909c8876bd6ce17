use crate::config::AnprServiceConfig;
use crate::engine::Engines;
use crate::error::AnprError;
use crate::pipeline::{PipelineConfig, PlatePipeline};
use common::plates::{EngineStatus, PlateResponse, ReadinessResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics::ANPR_REQUESTS;
use tracing::{debug, error};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AnprState {
    inner: Arc<AnprStateInner>,
}

struct AnprStateInner {
    pipeline: PlatePipeline,
    request_timeout: Duration,
    max_upload_bytes: usize,
}

impl AnprState {
    pub fn new(engines: Engines, pipeline: PipelineConfig) -> Self {
        Self::with_limits(engines, pipeline, DEFAULT_REQUEST_TIMEOUT, DEFAULT_MAX_UPLOAD_BYTES)
    }

    pub fn from_config(engines: Engines, config: &AnprServiceConfig) -> Self {
        Self::with_limits(
            engines,
            config.pipeline,
            config.request_timeout,
            config.max_upload_bytes,
        )
    }

    pub fn with_limits(
        engines: Engines,
        pipeline: PipelineConfig,
        request_timeout: Duration,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(AnprStateInner {
                pipeline: PlatePipeline::new(engines, pipeline),
                request_timeout,
                max_upload_bytes,
            }),
        }
    }

    pub fn pipeline(&self) -> &PlatePipeline {
        &self.inner.pipeline
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.max_upload_bytes
    }

    /// Analyse one uploaded image on the blocking pool, bounded by the
    /// request timeout.
    ///
    /// `endpoint` only labels the request metrics.
    pub async fn analyze(&self, endpoint: &str, bytes: Vec<u8>) -> Result<PlateResponse, AnprError> {
        let started = Instant::now();
        let result = self.run_pipeline(bytes).await;

        let outcome = match &result {
            Ok(response) if response.has_plate() => "plate",
            Ok(_) => "no_plate",
            Err(e) => e.kind(),
        };
        ANPR_REQUESTS.with_label_values(&[endpoint, outcome]).inc();
        debug!(
            endpoint,
            outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis request finished"
        );

        result
    }

    async fn run_pipeline(&self, bytes: Vec<u8>) -> Result<PlateResponse, AnprError> {
        let pipeline = self.inner.pipeline.clone();
        let task = tokio::task::spawn_blocking(move || {
            pipeline
                .analyze_bytes(&bytes)
                .map(|result| result.to_response(pipeline.view_tag()))
        });

        let timeout = self.inner.request_timeout;
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                error!(error = %join_err, "analysis task panicked");
                Err(AnprError::internal("analysis task failed"))
            }
            // The blocking task keeps running to completion; its result is discarded
            Err(_) => Err(AnprError::Timeout(timeout.as_secs())),
        }
    }

    /// Engine report for `/readyz`. Engines are loaded before the state
    /// exists, so both are always ready once serving.
    pub fn readiness(&self) -> ReadinessResponse {
        let engines = self.inner.pipeline.engines();
        ReadinessResponse {
            status: "ready".to_string(),
            detector: EngineStatus {
                name: engines.detector.name().to_string(),
                ready: true,
                execution_provider: engines.detector.execution_provider(),
            },
            recognizer: EngineStatus {
                name: engines.recognizer.name().to_string(),
                ready: true,
                execution_provider: engines.recognizer.execution_provider(),
            },
        }
    }
}
