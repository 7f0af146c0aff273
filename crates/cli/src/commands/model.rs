//! Model artifact commands: resolve the latest artifact, inspect one

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use predictor_lib::predictor::{
    ArtifactManifest, ArtifactPattern, DecodePath, FeatureExtractor, Model, ModelResolver,
    OnnxModelLoader, ResolvedArtifact, DEFAULT_MODEL_PATTERN,
};
use predictor_lib::PredictionRequest;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::output::{
    format_timestamp, print_error, print_info, print_json, print_success, print_warning,
    OutputFormat,
};

#[derive(Debug, Serialize)]
struct ResolvedView {
    path: PathBuf,
    identifier: String,
    modified: DateTime<Utc>,
}

/// Show the artifact the service would use right now
pub fn resolve(model_dir: &Path, pattern: Option<&str>, format: OutputFormat) -> Result<()> {
    let pattern = ArtifactPattern::parse(pattern.unwrap_or(DEFAULT_MODEL_PATTERN))?;
    let resolver = ModelResolver::new(model_dir, pattern);
    let artifact = resolver.resolve_latest()?;

    let view = ResolvedView {
        path: artifact.path.clone(),
        identifier: artifact.identifier.clone(),
        modified: DateTime::<Utc>::from(artifact.modified),
    };

    match format {
        OutputFormat::Json => print_json(&view),
        OutputFormat::Table => {
            println!("{}", "Latest Artifact".bold());
            println!("{}", "=".repeat(50));
            println!("Identifier: {}", view.identifier.cyan());
            println!("Path:       {}", view.path.display());
            println!("Modified:   {}", format_timestamp(&view.modified));
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct ProbeView {
    output: Option<f64>,
    error: Option<String>,
    elapsed_us: u64,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    path: PathBuf,
    identifier: String,
    manifest: Option<ArtifactManifest>,
    manifest_error: Option<String>,
    loadable: bool,
    /// `optimized` or `recovered` (permissive decode)
    decode_path: Option<&'static str>,
    size_bytes: Option<u64>,
    schema_version: Option<u32>,
    features: Vec<&'static str>,
    error_kind: Option<&'static str>,
    error: Option<String>,
    probe: Option<ProbeView>,
}

/// Load an artifact the way the service does and report on it
pub fn inspect(artifact: &Path, probe: bool, format: OutputFormat) -> Result<()> {
    let resolved = ResolvedArtifact::from_path(artifact)
        .with_context(|| format!("Cannot read artifact {}", artifact.display()))?;

    let (manifest, manifest_error) = match ArtifactManifest::load_for(&resolved.path) {
        Ok(manifest) => (Some(manifest), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let mut report = InspectReport {
        path: resolved.path.clone(),
        identifier: resolved.identifier.clone(),
        manifest,
        manifest_error,
        loadable: false,
        decode_path: None,
        size_bytes: None,
        schema_version: None,
        features: Vec::new(),
        error_kind: None,
        error: None,
        probe: None,
    };

    match OnnxModelLoader::new().load_artifact(&resolved) {
        Ok(loaded) => {
            report.loadable = true;
            report.decode_path = Some(match loaded.decode_path {
                DecodePath::Optimized => "optimized",
                DecodePath::Recovered => "recovered",
            });
            report.size_bytes = Some(loaded.size_bytes);
            report.schema_version = Some(loaded.model.schema().version());
            report.features = loaded.model.schema().names();
            if probe {
                report.probe = Some(probe_model(&loaded.model));
            }
        }
        Err(e) => {
            report.error_kind = Some(e.kind());
            report.error = Some(e.to_string());
        }
    }

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            print_report(&report);
            Ok(())
        }
    }
}

/// One inference on a request made only of defaults
fn probe_model(model: &dyn Model) -> ProbeView {
    let request = PredictionRequest {
        timestamp: Utc::now(),
        plant_growth_stage: "Vegetative".to_string(),
        time_since_last_watering_hours: 0.0,
        readings: Vec::new(),
    };
    let features = FeatureExtractor::new().extract_with(&request, model.schema());

    let start = Instant::now();
    let outcome = model.predict(&features);
    let elapsed_us = start.elapsed().as_micros() as u64;

    match outcome {
        Ok(value) => ProbeView {
            output: Some(value),
            error: None,
            elapsed_us,
        },
        Err(e) => ProbeView {
            output: None,
            error: Some(e.to_string()),
            elapsed_us,
        },
    }
}

fn print_report(report: &InspectReport) {
    println!("{}", "Artifact Inspection".bold());
    println!("{}", "=".repeat(50));
    println!("Identifier: {}", report.identifier.cyan());
    println!("Path:       {}", report.path.display());
    println!();

    match (&report.manifest, &report.manifest_error) {
        (Some(manifest), _) => {
            println!("{}", "Manifest".bold());
            println!(
                "  Version:        {}",
                manifest.version.as_deref().unwrap_or("(file stem)")
            );
            println!("  Schema version: {}", manifest.schema_version);
            if let Some(trained_at) = &manifest.trained_at {
                println!("  Trained at:     {}", format_timestamp(trained_at));
            }
            if let Some(metrics) = &manifest.metrics {
                println!("  MAE / R²:       {:.3} / {:.3}", metrics.mae, metrics.r2);
            }
            println!(
                "  Checksum:       {}",
                if manifest.checksum_sha256.is_some() { "declared" } else { "not declared" }
            );
        }
        (None, Some(err)) => print_warning(&format!("Manifest unavailable: {}", err)),
        (None, None) => {}
    }
    println!();

    if report.loadable {
        print_success(&format!(
            "Loads ({} decode, {} bytes)",
            report.decode_path.unwrap_or("unknown"),
            report.size_bytes.unwrap_or(0)
        ));
        if report.decode_path == Some("recovered") {
            print_warning("Artifact needed compatibility recovery; consider re-exporting it");
        }
        if let Some(version) = report.schema_version {
            print_info(&format!(
                "Schema v{}: {}",
                version,
                report.features.join(", ")
            ));
        }
    } else {
        print_error(&format!(
            "Does not load [{}]: {}",
            report.error_kind.unwrap_or("unknown"),
            report.error.as_deref().unwrap_or("")
        ));
        print_info("The service would answer with fallback:model_load_error");
    }

    if let Some(probe) = &report.probe {
        match (probe.output, &probe.error) {
            (Some(value), _) => print_info(&format!(
                "Probe output: {:.2}h in {}µs",
                value, probe.elapsed_us
            )),
            (None, Some(err)) => print_warning(&format!("Probe failed: {}", err)),
            (None, None) => {}
        }
    }
}
