use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Request Metrics ====
    pub static ref ANPR_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("anpr_requests_total", "Total number of analysis requests"),
            &["endpoint", "outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ANPR_STAGE_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "anpr_stage_latency_seconds",
                "Latency of individual pipeline stages",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Inference Metrics ====
    pub static ref ANPR_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "anpr_inference_time_seconds",
                "Time spent in model inference (excluding pre/post processing)",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["model", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Result Metrics ====
    pub static ref ANPR_PLATE_GRAMMAR: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "anpr_plate_grammar_total",
                "Selected plate texts by matched grammar (legacy, mercosul, none, empty)",
            ),
            &["grammar"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ANPR_REGION_REJECTIONS: IntCounter = {
        let metric = IntCounter::new(
            "anpr_region_rejections_total",
            "Selected regions that collapsed to zero area after clamping",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ANPR_RECOGNITION_FAILURES: IntCounter = {
        let metric = IntCounter::new(
            "anpr_recognition_failures_total",
            "Text recognizer calls that failed and were treated as no candidates",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metrics_accessible() {
        let before = ANPR_REQUESTS
            .with_label_values(&["predict", "plate_found"])
            .get();
        ANPR_REQUESTS
            .with_label_values(&["predict", "plate_found"])
            .inc();
        assert_eq!(
            ANPR_REQUESTS
                .with_label_values(&["predict", "plate_found"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn test_encode_metrics_includes_registered_families() {
        ANPR_PLATE_GRAMMAR.with_label_values(&["legacy"]).inc();
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("anpr_plate_grammar_total"));
    }
}
