//! Observability infrastructure for the detection service
//!
//! Provides:
//! - Prometheus metrics (inference latency, predictions, errors, loaded models)
//! - Structured logging helpers with a stable `event` field
//! - Tracing subscriber setup (JSON or pretty output)

use crate::config::MonitoringConfig;
use crate::models::ModelKind;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Probability above which a detected threat is high severity
pub const HIGH_SEVERITY_THRESHOLD: f64 = 0.8;

/// Probability above which a detected threat is medium severity
pub const MEDIUM_SEVERITY_THRESHOLD: f64 = 0.5;

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    inference_latency_seconds: HistogramVec,
    predictions: IntCounterVec,
    prediction_errors: IntCounterVec,
    models_loaded: IntGauge,
    initialization_failures: IntCounter,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            inference_latency_seconds: register_histogram_vec!(
                "insider_detect_inference_latency_seconds",
                "Time spent in a single model forward pass",
                &["model"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            predictions: register_int_counter_vec!(
                "insider_detect_predictions_total",
                "Total number of completed predictions",
                &["model", "decision"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "insider_detect_prediction_errors_total",
                "Total number of failed predictions by originating error",
                &["cause"]
            )
            .expect("Failed to register prediction_errors_total"),

            models_loaded: register_int_gauge!(
                "insider_detect_models_loaded",
                "Number of primary models currently loaded"
            )
            .expect("Failed to register models_loaded"),

            initialization_failures: register_int_counter!(
                "insider_detect_initialization_failures_total",
                "Total number of failed model service initializations"
            )
            .expect("Failed to register initialization_failures_total"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn observe_inference_latency(&self, kind: ModelKind, duration_secs: f64) {
        self.inner()
            .inference_latency_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs);
    }

    pub fn inc_predictions(&self, kind: ModelKind, decision: u8) {
        let decision = if decision == 1 { "threat" } else { "benign" };
        self.inner()
            .predictions
            .with_label_values(&[kind.as_str(), decision])
            .inc();
    }

    pub fn inc_prediction_errors(&self, cause_code: &str) {
        self.inner()
            .prediction_errors
            .with_label_values(&[cause_code])
            .inc();
    }

    pub fn set_models_loaded(&self, count: i64) {
        self.inner().models_loaded.set(count);
    }

    pub fn inc_initialization_failures(&self) {
        self.inner().initialization_failures.inc();
    }
}

/// Threat severity for a hybrid or single-model probability
pub fn threat_severity(probability: f64) -> &'static str {
    if probability > HIGH_SEVERITY_THRESHOLD {
        "high"
    } else if probability > MEDIUM_SEVERITY_THRESHOLD {
        "medium"
    } else {
        "low"
    }
}

/// Structured logger for service events
#[derive(Clone)]
pub struct StructuredLogger {
    app_name: String,
}

impl StructuredLogger {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Log the timing of one completed prediction
    pub fn log_inference(
        &self,
        model: &str,
        inference_time_secs: f64,
        input_size: usize,
        request_id: Option<&str>,
    ) {
        info!(
            event = "model_inference",
            app = %self.app_name,
            model_name = %model,
            inference_time_ms = inference_time_secs * 1000.0,
            input_size = input_size,
            request_id = request_id.unwrap_or("-"),
            "Model inference completed"
        );
    }

    /// Log a positive threat decision
    pub fn log_threat_detected(
        &self,
        user_id: &str,
        session_id: &str,
        threat_score: f64,
        model: &str,
    ) {
        let severity = threat_severity(threat_score);
        warn!(
            event = "threat_detected",
            app = %self.app_name,
            user_id = %user_id,
            session_id = %session_id,
            threat_score = threat_score,
            severity = %severity,
            model_name = %model,
            "Insider threat detected"
        );
    }

    /// Log a failed prediction
    pub fn log_prediction_failed(&self, model: &str, code: &str, message: &str) {
        warn!(
            event = "prediction_failed",
            app = %self.app_name,
            model_name = %model,
            error_code = %code,
            error = %message,
            "Prediction failed"
        );
    }

    pub fn log_initialized(&self, models: &[ModelKind], elapsed_secs: f64) {
        info!(
            event = "service_initialized",
            app = %self.app_name,
            models = ?models,
            elapsed_secs = elapsed_secs,
            "Model service ready"
        );
    }

    pub fn log_initialization_failed(&self, code: &str, message: &str) {
        error!(
            event = "service_initialization_failed",
            app = %self.app_name,
            error_code = %code,
            error = %message,
            "Model service initialization failed"
        );
    }

    pub fn log_cleanup(&self) {
        info!(
            event = "service_cleanup",
            app = %self.app_name,
            "Model service resources released"
        );
    }

    pub fn log_startup(&self, version: &str, environment: &str) {
        info!(
            event = "service_started",
            app = %self.app_name,
            version = %version,
            environment = %environment,
            "Insider threat detection service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            app = %self.app_name,
            reason = %reason,
            "Insider threat detection service shutting down"
        );
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &MonitoringConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "pretty" {
        registry.with(fmt::layer().pretty()).try_init()?;
    } else {
        registry.with(fmt::layer().json()).try_init()?;
    }
    Ok(())
}
