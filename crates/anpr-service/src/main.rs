use anpr_service::{
    api,
    engine::{detector::YoloPlateDetector, recognizer::CtcTextRecognizer, Engines},
    AnprError, AnprServiceConfig, AnprState,
};
use anyhow::Result;
use std::sync::Arc;
use telemetry::LogConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize telemetry (logging and metrics)
    telemetry::init_structured_logging(LogConfig::new("anpr-service").with_version(common::VERSION));

    info!("Starting ANPR service...");

    // Load configuration from environment
    let config = AnprServiceConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        detector_model = %config.detector.model_path.display(),
        ocr_model = %config.recognizer.model_path.display(),
        provider = %config.detector.onnx.execution_provider,
        "ANPR service configuration loaded"
    );

    // Both engines must load before the listener is bound
    let engines = load_engines(&config).map_err(|e| {
        error!(error = %e, "failed to load inference engines");
        e
    })?;

    let state = AnprState::from_config(engines, &config);
    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("ANPR service listening on {}", config.bind_addr);

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ANPR service stopped");
    Ok(())
}

fn load_engines(config: &AnprServiceConfig) -> Result<Engines, AnprError> {
    let detector = YoloPlateDetector::load(config.detector.clone())
        .map_err(|e| AnprError::model_unavailable(format!("plate detector: {:#}", e)))?;
    let recognizer = CtcTextRecognizer::load(config.recognizer.clone())
        .map_err(|e| AnprError::model_unavailable(format!("text recognizer: {:#}", e)))?;

    Ok(Engines::new(Arc::new(detector), Arc::new(recognizer)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
