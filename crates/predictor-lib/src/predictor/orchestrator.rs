//! Graduated-fallback prediction pipeline
//!
//! Every request walks resolve → load → extract → predict. A failure at any
//! stage is mapped to a [`FallbackReason`] and answered by the rule-based
//! predictor instead, so callers always get a usable interval.

use super::fallback::FallbackPredictor;
use super::features::FeatureExtractor;
use super::inference::{validate_output, Model};
use super::loader::{ModelLoader, OnnxModelLoader};
use super::resolver::{ArtifactPattern, ModelResolver, PatternError, ResolveError, ResolvedArtifact};
use super::PredictorConfig;
use crate::models::{FallbackReason, PredictionRequest, PredictionResult, Provenance};
use crate::observability::{PredictorMetrics, StructuredLogger};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Last loaded model, reused while the latest artifact is unchanged
struct CachedModel {
    path: PathBuf,
    modified: SystemTime,
    model: Arc<dyn Model>,
}

/// Single-entry model cache keyed by artifact path and modification time
#[derive(Default)]
pub struct ModelCache {
    entry: RwLock<Option<CachedModel>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, artifact: &ResolvedArtifact) -> Option<Arc<dyn Model>> {
        let entry = self.entry.read().unwrap_or_else(|e| e.into_inner());
        entry
            .as_ref()
            .filter(|cached| cached.path == artifact.path && cached.modified == artifact.modified)
            .map(|cached| Arc::clone(&cached.model))
    }

    pub fn insert(&self, artifact: &ResolvedArtifact, model: Arc<dyn Model>) {
        let mut entry = self.entry.write().unwrap_or_else(|e| e.into_inner());
        *entry = Some(CachedModel {
            path: artifact.path.clone(),
            modified: artifact.modified,
            model,
        });
    }

    pub fn clear(&self) {
        let mut entry = self.entry.write().unwrap_or_else(|e| e.into_inner());
        *entry = None;
    }
}

/// Owns the full pipeline; no model state lives outside of it
pub struct PredictionOrchestrator {
    resolver: ModelResolver,
    loader: Arc<dyn ModelLoader>,
    extractor: FeatureExtractor,
    fallback: FallbackPredictor,
    cache: Option<ModelCache>,
    active_version: Mutex<Option<String>>,
    metrics: PredictorMetrics,
    logger: StructuredLogger,
}

impl PredictionOrchestrator {
    pub fn new(resolver: ModelResolver, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            resolver,
            loader,
            extractor: FeatureExtractor::new(),
            fallback: FallbackPredictor::new(),
            cache: None,
            active_version: Mutex::new(None),
            metrics: PredictorMetrics::new(),
            logger: StructuredLogger::new(env!("CARGO_PKG_NAME")),
        }
    }

    /// Build the ONNX-backed pipeline described by `config`
    pub fn from_config(config: &PredictorConfig) -> Result<Self, PatternError> {
        let pattern = ArtifactPattern::parse(&config.model_pattern)?;
        let resolver = ModelResolver::new(&config.model_dir, pattern);
        let loader = OnnxModelLoader::with_limits(
            config.max_artifact_bytes,
            Duration::from_millis(config.slow_inference_ms),
        );
        Ok(Self::new(resolver, Arc::new(loader)).with_cache(config.cache_models))
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(ModelCache::new);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Version of the model that answered most recently, if any
    pub fn active_version(&self) -> Option<String> {
        self.active_version
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Answer a request; never fails
    pub fn predict(&self, request: &PredictionRequest) -> PredictionResult {
        let start = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.predict_with_model(request)))
            .unwrap_or_else(|_| {
                warn!("Model pipeline panicked");
                Err(FallbackReason::UnexpectedError("panic".to_string()))
            });

        let (hours_until_next_watering, provenance) = match outcome {
            Ok((hours, version)) => (hours, Provenance::Model { version }),
            Err(reason) => {
                debug!(stage = "fallback", reason = %reason, "Pipeline transition");
                let hours = self.fallback.predict(
                    &request.snapshot(),
                    request.growth_stage(),
                    request.time_since_last_watering_hours,
                    &reason,
                );
                warn!(reason = %reason, hours = hours, "Serving fallback prediction");
                (hours, Provenance::Fallback(reason))
            }
        };

        let result = PredictionResult {
            prediction_time: request.timestamp,
            hours_until_next_watering,
            provenance,
        };

        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.record_prediction(&result);
        debug!(stage = "done", provenance = %result.provenance, "Pipeline transition");
        result
    }

    fn predict_with_model(&self, request: &PredictionRequest) -> Result<(f64, String), FallbackReason> {
        debug!(stage = "resolving", dir = %self.resolver.dir().display(), "Pipeline transition");
        let artifact = self.resolver.resolve_latest().map_err(|e| match e {
            ResolveError::NotFound { .. } => FallbackReason::NoModelFound,
            ResolveError::Io { .. } => {
                warn!(error = %e, "Model directory unreadable");
                FallbackReason::UnexpectedError("io".to_string())
            }
        })?;

        debug!(stage = "loading", artifact = %artifact.identifier, "Pipeline transition");
        let model = self.load(&artifact)?;

        debug!(stage = "extracting", schema_version = model.schema().version(), "Pipeline transition");
        let features = self.extractor.extract_with(request, model.schema());

        debug!(stage = "predicting", features = features.len(), "Pipeline transition");
        let hours = model
            .predict(&features)
            .and_then(validate_output)
            .map_err(|e| {
                warn!(error = %e, version = %model.version(), "Model prediction failed");
                FallbackReason::PredictionError(e.kind().to_string())
            })?;

        self.activate(&artifact, model.as_ref());
        Ok((hours, model.version().to_string()))
    }

    fn load(&self, artifact: &ResolvedArtifact) -> Result<Arc<dyn Model>, FallbackReason> {
        if let Some(model) = self.cache.as_ref().and_then(|cache| cache.get(artifact)) {
            debug!(artifact = %artifact.identifier, "Model cache hit");
            return Ok(model);
        }

        let model = self.loader.load(artifact).map_err(|e| {
            warn!(
                error = %e,
                kind = e.kind(),
                path = %artifact.path.display(),
                "Model artifact could not be loaded"
            );
            FallbackReason::ModelLoadError(e.kind().to_string())
        })?;

        if let Some(cache) = &self.cache {
            cache.insert(artifact, Arc::clone(&model));
        }
        Ok(model)
    }

    /// Record the answering model, logging when it changes
    fn activate(&self, artifact: &ResolvedArtifact, model: &dyn Model) {
        let mut active = self.active_version.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_deref() == Some(model.version()) {
            return;
        }
        self.logger.log_model_loaded(
            model.version(),
            &artifact.path.display().to_string(),
            model.schema().version(),
        );
        self.metrics
            .set_model_version(model.version(), model.schema().version());
        *active = Some(model.version().to_string());
    }
}
