//! Observability infrastructure for the irrigation predictor
//!
//! Provides:
//! - Prometheus metrics (prediction latency, model load latency, fallback counts, model version)
//! - Structured JSON logging with tracing

use crate::models::{PredictionResult, Provenance};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Model loads parse and optimize a graph, so they get coarser buckets
const LOAD_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

static GLOBAL_METRICS: OnceLock<PredictorMetricsInner> = OnceLock::new();

struct PredictorMetricsInner {
    prediction_latency_seconds: Histogram,
    model_load_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    fallbacks_total: IntCounterVec,
    compat_recoveries_total: IntCounter,
    model_version_info: GaugeVec,
    batch_runs_total: IntCounter,
    sink_errors_total: IntCounter,
}

impl PredictorMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "irrigation_prediction_latency_seconds",
                "End-to-end time to answer a prediction request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            model_load_latency_seconds: register_histogram!(
                "irrigation_model_load_latency_seconds",
                "Time spent loading and decoding a model artifact",
                LOAD_BUCKETS.to_vec()
            )
            .expect("Failed to register model_load_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "irrigation_predictions_total",
                "Predictions served, by source",
                &["source"]
            )
            .expect("Failed to register predictions_total"),

            fallbacks_total: register_int_counter_vec!(
                "irrigation_fallbacks_total",
                "Fallback predictions served, by reason kind",
                &["reason"]
            )
            .expect("Failed to register fallbacks_total"),

            compat_recoveries_total: register_int_counter!(
                "irrigation_model_compat_recoveries_total",
                "Artifacts loaded through the permissive decode path"
            )
            .expect("Failed to register compat_recoveries_total"),

            model_version_info: register_gauge_vec!(
                "irrigation_model_version_info",
                "Information about the most recently used model",
                &["version", "schema_version"]
            )
            .expect("Failed to register model_version_info"),

            batch_runs_total: register_int_counter!(
                "irrigation_batch_runs_total",
                "Completed scheduled batch runs"
            )
            .expect("Failed to register batch_runs_total"),

            sink_errors_total: register_int_counter!(
                "irrigation_prediction_sink_errors_total",
                "Predictions that could not be recorded"
            )
            .expect("Failed to register sink_errors_total"),
        }
    }
}

/// Handle to the process-wide predictor metrics
///
/// Clones share the same registered collectors.
#[derive(Debug, Clone)]
pub struct PredictorMetrics {
    _private: (),
}

impl Default for PredictorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PredictorMetricsInner {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn observe_model_load_latency(&self, duration_secs: f64) {
        self.inner().model_load_latency_seconds.observe(duration_secs);
    }

    /// Count a served prediction under its source (`model` or `fallback`)
    pub fn record_prediction(&self, result: &PredictionResult) {
        let inner = self.inner();
        match &result.provenance {
            Provenance::Model { .. } => {
                inner.predictions_total.with_label_values(&["model"]).inc();
            }
            Provenance::Fallback(reason) => {
                inner.predictions_total.with_label_values(&["fallback"]).inc();
                inner.fallbacks_total.with_label_values(&[reason.kind()]).inc();
            }
        }
    }

    pub fn inc_compat_recoveries(&self) {
        self.inner().compat_recoveries_total.inc();
    }

    pub fn set_model_version(&self, version: &str, schema_version: u32) {
        let inner = self.inner();
        inner.model_version_info.reset();
        inner
            .model_version_info
            .with_label_values(&[version, &schema_version.to_string()])
            .set(1.0);
    }

    pub fn inc_batch_runs(&self) {
        self.inner().batch_runs_total.inc();
    }

    pub fn inc_sink_errors(&self) {
        self.inner().sink_errors_total.inc();
    }
}

/// Structured logger for predictor events
///
/// Every significant event carries an `event` field so log pipelines can
/// filter on it without parsing messages.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Log a served prediction; fallbacks are logged at warn level
    pub fn log_prediction(&self, plant_id: Option<&str>, result: &PredictionResult, elapsed_ms: f64) {
        let plant_id = plant_id.unwrap_or("-");
        match &result.provenance {
            Provenance::Model { version } => {
                info!(
                    event = "prediction_generated",
                    service = %self.service_name,
                    plant_id = %plant_id,
                    hours_until_next_watering = result.hours_until_next_watering,
                    model_version = %version,
                    elapsed_ms = elapsed_ms,
                    "Generated watering prediction"
                );
            }
            Provenance::Fallback(reason) => {
                warn!(
                    event = "fallback_used",
                    service = %self.service_name,
                    plant_id = %plant_id,
                    hours_until_next_watering = result.hours_until_next_watering,
                    reason = %reason,
                    elapsed_ms = elapsed_ms,
                    "Served rule-based fallback prediction"
                );
            }
        }
    }

    /// Log a prediction handed to the logging sink
    pub fn log_prediction_recorded(&self, result: &PredictionResult) {
        info!(
            event = "prediction_recorded",
            service = %self.service_name,
            prediction_time = %result.prediction_time.to_rfc3339(),
            hours_until_next_watering = result.hours_until_next_watering,
            provenance = %result.provenance,
            "Prediction recorded"
        );
    }

    pub fn log_model_loaded(&self, version: &str, path: &str, schema_version: u32) {
        info!(
            event = "model_loaded",
            service = %self.service_name,
            model_version = %version,
            path = %path,
            schema_version = schema_version,
            "Model artifact activated"
        );
    }

    pub fn log_batch_completed(&self, total: usize, model_backed: usize, fallback: usize, sink_errors: usize) {
        if sink_errors > 0 {
            warn!(
                event = "batch_completed",
                service = %self.service_name,
                total = total,
                model_backed = model_backed,
                fallback = fallback,
                sink_errors = sink_errors,
                "Batch completed with unrecorded predictions"
            );
        } else {
            info!(
                event = "batch_completed",
                service = %self.service_name,
                total = total,
                model_backed = model_backed,
                fallback = fallback,
                "Batch completed"
            );
        }
    }

    pub fn log_startup(&self, version: &str, model_dir: &str) {
        info!(
            event = "service_started",
            service = %self.service_name,
            service_version = %version,
            model_dir = %model_dir,
            "Irrigation predictor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service_name,
            reason = %reason,
            "Irrigation predictor shutting down"
        );
    }
}
