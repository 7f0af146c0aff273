//! Sidecar manifest published next to every trained artifact
//!
//! `reg_model_<ts>.onnx` is accompanied by `reg_model_<ts>.json`, written by
//! the training pipeline. It pins the feature layout the model was trained
//! with so a layout drift fails loudly at load time instead of silently
//! producing garbage predictions.

use super::features::{FeatureSchema, SchemaError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest {0} not found")]
    Missing(PathBuf),
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Offline evaluation scores recorded by the trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub mae: f64,
    pub r2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Model version; the artifact file stem is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub schema_version: u32,
    /// Explicit column order; takes precedence over the built-in layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
}

impl ArtifactManifest {
    pub fn path_for(artifact: &Path) -> PathBuf {
        artifact.with_extension(MANIFEST_EXTENSION)
    }

    /// Read the sidecar of `artifact`
    pub fn load_for(artifact: &Path) -> Result<Self, ManifestError> {
        let path = Self::path_for(artifact);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ManifestError::Missing(path)),
            Err(source) => return Err(ManifestError::Read { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ManifestError::Parse { path, source })
    }

    pub fn feature_schema(&self) -> Result<FeatureSchema, SchemaError> {
        match &self.features {
            Some(names) => FeatureSchema::from_names(self.schema_version, names),
            None => FeatureSchema::for_version(self.schema_version),
        }
    }

    /// Compare the declared checksum (if any) with the artifact bytes
    pub fn verify_checksum(&self, bytes: &[u8]) -> Result<(), ChecksumMismatch> {
        let Some(expected) = &self.checksum_sha256 else {
            return Ok(());
        };
        let actual = compute_checksum(bytes);
        if actual.eq_ignore_ascii_case(expected.trim()) {
            Ok(())
        } else {
            Err(ChecksumMismatch {
                expected: expected.clone(),
                actual,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChecksumMismatch {
    pub expected: String,
    pub actual: String,
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
