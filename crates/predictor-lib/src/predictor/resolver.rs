//! Locates the most recently trained artifact in the model directory
//!
//! The directory is listed on every call so a freshly published artifact
//! takes effect without a restart.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

/// Default artifact naming convention of the training pipeline
pub const DEFAULT_MODEL_PATTERN: &str = "reg_model_*.onnx";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no artifact matching {pattern:?} in {dir}")]
    NotFound { dir: PathBuf, pattern: String },
    #[error("failed to list model directory {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error, PartialEq)]
#[error("artifact pattern {0:?} must contain exactly one '*'")]
pub struct PatternError(String);

/// File-name pattern with a single `*` wildcard, e.g. `reg_model_*.onnx`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPattern {
    raw: String,
    prefix: String,
    suffix: String,
}

impl ArtifactPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut parts = pattern.split('*');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(suffix), None) => Ok(Self {
                raw: pattern.to_string(),
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
            _ => Err(PatternError(pattern.to_string())),
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        file_name.len() >= self.prefix.len() + self.suffix.len()
            && file_name.starts_with(&self.prefix)
            && file_name.ends_with(&self.suffix)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for ArtifactPattern {
    fn default() -> Self {
        Self {
            raw: DEFAULT_MODEL_PATTERN.to_string(),
            prefix: "reg_model_".to_string(),
            suffix: ".onnx".to_string(),
        }
    }
}

/// An artifact chosen by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// File stem, e.g. `reg_model_2024-06-10_12-00-00`
    pub identifier: String,
}

impl ResolvedArtifact {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let modified = fs::metadata(path)?.modified()?;
        Ok(Self {
            path: path.to_path_buf(),
            modified,
            identifier: identifier_for(path),
        })
    }
}

fn identifier_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Finds the latest artifact by modification time
#[derive(Debug, Clone)]
pub struct ModelResolver {
    dir: PathBuf,
    pattern: ArtifactPattern,
}

impl ModelResolver {
    pub fn new(dir: impl Into<PathBuf>, pattern: ArtifactPattern) -> Self {
        Self {
            dir: dir.into(),
            pattern,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pattern(&self) -> &ArtifactPattern {
        &self.pattern
    }

    /// Newest matching artifact. Equal modification times are broken by the
    /// lexicographically greatest file name.
    pub fn resolve_latest(&self) -> Result<ResolvedArtifact, ResolveError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "Model directory does not exist");
                return Err(self.not_found());
            }
            Err(source) => {
                return Err(ResolveError::Io {
                    dir: self.dir.clone(),
                    source,
                })
            }
        };

        let mut latest: Option<(SystemTime, String, PathBuf)> = None;
        for entry in entries {
            let entry = entry.map_err(|source| ResolveError::Io {
                dir: self.dir.clone(),
                source,
            })?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !self.pattern.matches(&file_name) {
                continue;
            }
            // Files can disappear under retention between listing and stat
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    debug!(file = %file_name, error = %e, "Skipping unreadable artifact");
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let candidate = (modified, file_name, entry.path());
            let newer = match &latest {
                None => true,
                Some((m, name, _)) => (candidate.0, &candidate.1) > (*m, name),
            };
            if newer {
                latest = Some(candidate);
            }
        }

        let (modified, _, path) = latest.ok_or_else(|| self.not_found())?;
        debug!(path = %path.display(), "Resolved latest artifact");
        Ok(ResolvedArtifact {
            identifier: identifier_for(&path),
            path,
            modified,
        })
    }

    fn not_found(&self) -> ResolveError {
        ResolveError::NotFound {
            dir: self.dir.clone(),
            pattern: self.pattern.as_str().to_string(),
        }
    }
}
