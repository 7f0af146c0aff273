//! Watering-interval prediction engine

mod fallback;
mod features;
mod inference;
mod loader;
mod manifest;
mod orchestrator;
mod resolver;
mod scheduler;

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
mod tests;

pub use fallback::{
    FallbackEstimate, FallbackPredictor, FallbackRule, RuleApplication, MAX_FALLBACK_HOURS,
    MIN_FALLBACK_HOURS,
};
pub use features::{
    Feature, FeatureExtractor, FeatureSchema, FeatureVector, SchemaError, CURRENT_SCHEMA_VERSION,
    LEGACY_SCHEMA_VERSION,
};
pub use inference::{
    validate_output, InferenceStats, Model, OnnxModel, PredictionError, DEFAULT_SLOW_INFERENCE,
};
pub use loader::{
    is_compatibility_error, DecodePath, LoadError, LoadedArtifact, ModelLoader, OnnxModelLoader,
    DEFAULT_MAX_ARTIFACT_BYTES,
};
pub use manifest::{
    compute_checksum, ArtifactManifest, ChecksumMismatch, ManifestError, TrainingMetrics,
};
pub use orchestrator::{ModelCache, PredictionOrchestrator};
pub use resolver::{
    ArtifactPattern, ModelResolver, PatternError, ResolveError, ResolvedArtifact,
    DEFAULT_MODEL_PATTERN,
};
pub use scheduler::{
    BatchScheduler, BatchSource, BatchSummary, SchedulerStats, DEFAULT_BATCH_INTERVAL,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings of the prediction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Directory the trainer publishes artifacts into
    pub model_dir: PathBuf,
    /// Single-`*` file-name pattern of artifacts
    pub model_pattern: String,
    /// Reuse the loaded model while the latest artifact is unchanged
    pub cache_models: bool,
    pub max_artifact_bytes: u64,
    pub slow_inference_ms: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("trained_models"),
            model_pattern: DEFAULT_MODEL_PATTERN.to_string(),
            cache_models: false,
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            slow_inference_ms: DEFAULT_SLOW_INFERENCE.as_millis() as u64,
        }
    }
}
