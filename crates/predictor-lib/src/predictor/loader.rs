//! Artifact loading with compatibility recovery
//!
//! Artifacts are exported by an offline trainer whose library versions drift
//! away from the runtime's. The protobuf is parsed once and its declared
//! input width is checked against the manifest schema before any graph
//! translation, so schema drift is reported as such. The primary decode then
//! builds a fully optimized plan. When it fails with an error carrying a known
//! version-skew signature, the graph is translated again ignoring the
//! exporter's declared output facts and typed without the optimizer passes
//! before giving up. The loader never substitutes a model of its own;
//! deciding what to do without one is the orchestrator's job.

use super::features::{FeatureSchema, SchemaError};
use super::inference::{Model, OnnxModel, TractModel, DEFAULT_SLOW_INFERENCE};
use super::manifest::{ArtifactManifest, ManifestError};
use super::resolver::ResolvedArtifact;
use crate::observability::PredictorMetrics;
use anyhow::Context;
use std::fs;
use std::io::{self, Cursor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tract_onnx::pb;
use tract_onnx::pb::tensor_shape_proto::dimension::Value as Dim;
use tract_onnx::pb::type_proto::Value as TypeValue;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Default upper bound on artifact size (16 MiB)
pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 16 * 1024 * 1024;

const PARSE_CONTEXT: &str = "Failed to parse ONNX model";
const TRANSLATE_CONTEXT: &str = "Failed to translate ONNX graph";
const SHAPE_CONTEXT: &str = "Failed to set input shape";
const OPTIMIZE_CONTEXT: &str = "Failed to optimize model";
const TYPING_CONTEXT: &str = "Failed to type model graph";
const RUNNABLE_CONTEXT: &str = "Failed to create runnable model";

/// Error signatures of exporter/runtime version skew (matched lowercase)
const COMPATIBILITY_MARKERS: &[&str] = &[
    "failed to optimize model",
    "opset",
    "ir version",
    "ir_version",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("artifact feature schema rejected: {0}")]
    SchemaMismatch(#[from] SchemaError),
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("artifact {path} is {size} bytes, limit is {limit}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("incompatible artifact encoding: {0:#}")]
    Incompatible(anyhow::Error),
    #[error("failed to decode artifact: {0:#}")]
    Decode(anyhow::Error),
}

impl LoadError {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::Manifest(_) => "manifest",
            LoadError::SchemaMismatch(_) => "schema_mismatch",
            LoadError::Io { .. } => "io",
            LoadError::TooLarge { .. } => "too_large",
            LoadError::ChecksumMismatch { .. } => "checksum_mismatch",
            LoadError::Incompatible(_) => "incompatible",
            LoadError::Decode(_) => "decode",
        }
    }
}

/// Turns a resolved artifact into a runnable model
pub trait ModelLoader: Send + Sync {
    fn load(&self, artifact: &ResolvedArtifact) -> Result<Arc<dyn Model>, LoadError>;
}

/// True when the error chain carries a known version-skew signature
pub fn is_compatibility_error(err: &anyhow::Error) -> bool {
    let chain = format!("{:#}", err).to_lowercase();
    COMPATIBILITY_MARKERS.iter().any(|marker| chain.contains(marker))
}

/// Which decode path produced the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    Optimized,
    /// Permissive decode after a recognized compatibility failure
    Recovered,
}

/// A loaded ONNX artifact with the details of how it was loaded
pub struct LoadedArtifact {
    pub model: OnnxModel,
    pub manifest: ArtifactManifest,
    pub decode_path: DecodePath,
    pub size_bytes: u64,
}

/// Loads ONNX artifacts with their sidecar manifest
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    max_artifact_bytes: u64,
    slow_inference: Duration,
    metrics: PredictorMetrics,
}

impl Default for OnnxModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl OnnxModelLoader {
    pub fn new() -> Self {
        Self {
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            slow_inference: DEFAULT_SLOW_INFERENCE,
            metrics: PredictorMetrics::new(),
        }
    }

    pub fn with_limits(max_artifact_bytes: u64, slow_inference: Duration) -> Self {
        Self {
            max_artifact_bytes,
            slow_inference,
            metrics: PredictorMetrics::new(),
        }
    }

    /// Full load, keeping the manifest and decode details
    pub fn load_artifact(&self, artifact: &ResolvedArtifact) -> Result<LoadedArtifact, LoadError> {
        let start = Instant::now();
        let path = &artifact.path;

        let manifest = ArtifactManifest::load_for(path)?;
        let schema = manifest.feature_schema()?;

        let size = fs::metadata(path)
            .map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?
            .len();
        if size > self.max_artifact_bytes {
            return Err(LoadError::TooLarge {
                path: path.clone(),
                size,
                limit: self.max_artifact_bytes,
            });
        }

        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        manifest
            .verify_checksum(&bytes)
            .map_err(|mismatch| LoadError::ChecksumMismatch {
                path: path.clone(),
                expected: mismatch.expected,
                actual: mismatch.actual,
            })?;

        let (plan, decode_path) = self.decode(&bytes, &schema)?;

        let version = manifest
            .version
            .clone()
            .unwrap_or_else(|| artifact.identifier.clone());
        let elapsed = start.elapsed();
        self.metrics.observe_model_load_latency(elapsed.as_secs_f64());

        info!(
            version = %version,
            path = %path.display(),
            schema_version = schema.version(),
            features = schema.len(),
            recovered = decode_path == DecodePath::Recovered,
            elapsed_ms = elapsed.as_millis() as u64,
            "Model artifact loaded"
        );

        Ok(LoadedArtifact {
            model: OnnxModel::new(plan, version, schema, self.slow_inference),
            manifest,
            decode_path,
            size_bytes: size,
        })
    }

    fn decode(
        &self,
        bytes: &[u8],
        schema: &FeatureSchema,
    ) -> Result<(TractModel, DecodePath), LoadError> {
        let proto = tract_onnx::onnx()
            .proto_model_for_read(&mut Cursor::new(bytes))
            .context(PARSE_CONTEXT)
            .map_err(LoadError::Decode)?;

        let width = schema.len();
        if let Some(declared) = declared_input_width(&proto) {
            if declared != width {
                return Err(SchemaError::InputWidthMismatch {
                    declared,
                    expected: width,
                }
                .into());
            }
        }

        let primary = match decode_optimized(&proto, width) {
            Ok(plan) => return Ok((plan, DecodePath::Optimized)),
            Err(e) => e,
        };

        if !is_compatibility_error(&primary) {
            return Err(LoadError::Decode(primary));
        }

        warn!(error = %format!("{:#}", primary), "Artifact incompatible with runtime, retrying permissive decode");
        match decode_permissive(&proto, width) {
            Ok(plan) => {
                self.metrics.inc_compat_recoveries();
                info!("Artifact recovered with permissive decode");
                Ok((plan, DecodePath::Recovered))
            }
            Err(secondary) => {
                debug!(error = %format!("{:#}", secondary), "Permissive decode failed");
                Err(LoadError::Incompatible(primary))
            }
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, artifact: &ResolvedArtifact) -> Result<Arc<dyn Model>, LoadError> {
        let loaded = self.load_artifact(artifact)?;
        Ok(Arc::new(loaded.model))
    }
}

/// Trailing dimension of the first graph input that is not an initializer.
/// `None` when the exporter left it symbolic or undeclared.
fn declared_input_width(proto: &pb::ModelProto) -> Option<usize> {
    let graph = proto.graph.as_ref()?;
    let input = graph
        .input
        .iter()
        .find(|input| !graph.initializer.iter().any(|init| init.name == input.name))?;
    let TypeValue::TensorType(tensor) = input.r#type.as_ref()?.value.as_ref()?;
    match tensor.shape.as_ref()?.dim.last()?.value.as_ref()? {
        Dim::DimValue(n) => usize::try_from(*n).ok(),
        Dim::DimParam(_) => None,
    }
}

/// Translate, pin the input shape, optimize
fn decode_optimized(proto: &pb::ModelProto, width: usize) -> anyhow::Result<TractModel> {
    let model = tract_onnx::onnx()
        .model_for_proto_model(proto)
        .context(TRANSLATE_CONTEXT)?
        .with_input_fact(0, f32::fact([1, width]).into())
        .context(SHAPE_CONTEXT)?
        .into_optimized()
        .context(OPTIMIZE_CONTEXT)?
        .into_runnable()
        .context(RUNNABLE_CONTEXT)?;
    Ok(model)
}

/// Translate without the exporter's output facts, typed but left unoptimized
fn decode_permissive(proto: &pb::ModelProto, width: usize) -> anyhow::Result<TractModel> {
    let model = tract_onnx::onnx()
        .with_ignore_output_shapes(true)
        .with_ignore_output_types(true)
        .model_for_proto_model(proto)
        .context(TRANSLATE_CONTEXT)?
        .with_input_fact(0, f32::fact([1, width]).into())
        .context(SHAPE_CONTEXT)?
        .into_typed()
        .context(TYPING_CONTEXT)?
        .into_runnable()
        .context(RUNNABLE_CONTEXT)?;
    Ok(model)
}
