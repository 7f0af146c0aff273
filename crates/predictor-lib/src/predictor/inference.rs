//! ONNX inference using tract
//!
//! Trained regressors are exported to ONNX and executed with tract-onnx. The
//! model is treated as a black box mapping one feature row to the number of
//! hours until the next watering.

use super::features::{FeatureSchema, FeatureVector};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Default latency above which an inference is reported as slow
pub const DEFAULT_SLOW_INFERENCE: Duration = Duration::from_millis(5);

pub(crate) type TractModel =
    SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("feature vector has {actual} values, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),
    #[error("model produced no output")]
    EmptyOutput,
    #[error("model produced non-finite output {0}")]
    NonFiniteOutput(f64),
    #[error("model produced non-positive output {0}")]
    NonPositiveOutput(f64),
}

impl PredictionError {
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::ShapeMismatch { .. } => "shape_mismatch",
            PredictionError::Inference(_) => "inference",
            PredictionError::EmptyOutput => "empty_output",
            PredictionError::NonFiniteOutput(_) => "non_finite_output",
            PredictionError::NonPositiveOutput(_) => "non_positive_output",
        }
    }
}

/// A loaded, ready-to-run trained model
pub trait Model: Send + Sync {
    /// Raw model output for one feature row
    fn predict(&self, features: &FeatureVector) -> Result<f64, PredictionError>;

    /// Version reported in result provenance
    fn version(&self) -> &str;

    /// Feature layout the model was trained with
    fn schema(&self) -> &FeatureSchema;
}

/// Reject outputs that cannot be a watering interval
pub fn validate_output(value: f64) -> Result<f64, PredictionError> {
    if !value.is_finite() {
        return Err(PredictionError::NonFiniteOutput(value));
    }
    if value <= 0.0 {
        return Err(PredictionError::NonPositiveOutput(value));
    }
    Ok(value)
}

/// ONNX-based model using tract for lightweight inference
pub struct OnnxModel {
    plan: TractModel,
    version: String,
    schema: FeatureSchema,
    slow_inference: Duration,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl OnnxModel {
    pub(crate) fn new(
        plan: TractModel,
        version: String,
        schema: FeatureSchema,
        slow_inference: Duration,
    ) -> Self {
        Self {
            plan,
            version,
            schema,
            slow_inference,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }

    /// Convert feature vector to a `[1, n]` tensor
    fn features_to_tensor(&self, features: &FeatureVector) -> Result<Tensor, PredictionError> {
        let width = features.len();
        let array = tract_ndarray::Array2::from_shape_vec((1, width), features.as_f32())
            .map_err(|e| PredictionError::Inference(e.into()))?;
        Ok(array.into())
    }

    /// Get inference statistics
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}

impl Model for OnnxModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64, PredictionError> {
        if features.len() != self.schema.len() {
            return Err(PredictionError::ShapeMismatch {
                expected: self.schema.len(),
                actual: features.len(),
            });
        }

        let start = Instant::now();
        let input = self.features_to_tensor(features)?;

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(PredictionError::Inference)?;
        let output = outputs.first().ok_or(PredictionError::EmptyOutput)?;
        let output = output
            .cast_to::<f32>()
            .map_err(PredictionError::Inference)?;
        let view = output
            .to_array_view::<f32>()
            .map_err(PredictionError::Inference)?;
        let value = view.iter().next().copied().ok_or(PredictionError::EmptyOutput)?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        if elapsed > self.slow_inference {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                version = %self.version,
                "Inference exceeded {}ms target",
                self.slow_inference.as_millis()
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, "Inference completed");
        }

        Ok(f64::from(value))
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }
}

/// Inference statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}
