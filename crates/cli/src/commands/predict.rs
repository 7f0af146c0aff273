//! Local prediction against a model directory

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use predictor_lib::predictor::{FallbackPredictor, DEFAULT_MODEL_PATTERN};
use predictor_lib::{
    PredictionOrchestrator, PredictionRequest, PredictionResult, PredictorConfig, SensorKind,
    SensorReading,
};
use std::fs;
use std::path::{Path, PathBuf};
use tabled::Tabled;
use thiserror::Error;
use tracing::warn;

use crate::output::{format_hours, print_info, print_result, print_table, OutputFormat};

#[derive(Debug, Error, PartialEq)]
pub enum ReadingParseError {
    #[error("reading {0:?} must look like Name=value")]
    MissingSeparator(String),
    #[error("reading {0:?} has an empty sensor name")]
    EmptyName(String),
    #[error("reading {input:?} has a non-numeric value")]
    InvalidValue { input: String },
}

/// Parse `Soil Humidity=35.5` into a reading
pub fn parse_reading(input: &str) -> Result<SensorReading, ReadingParseError> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| ReadingParseError::MissingSeparator(input.to_string()))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(ReadingParseError::EmptyName(input.to_string()));
    }

    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| ReadingParseError::InvalidValue {
            input: input.to_string(),
        })?;

    if SensorKind::parse(name).is_none() {
        warn!(sensor = %name, "Sensor is not used by the predictor");
    }

    Ok(SensorReading::new(name, "", value))
}

/// Read a request from a JSON file
pub fn load_request(path: &Path) -> Result<PredictionRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse request file {}", path.display()))
}

/// Request from a file, or assembled from flags with the current time
pub fn build_request(
    request_file: Option<&Path>,
    stage: Option<String>,
    hours_since: Option<f64>,
    readings: &[String],
) -> Result<PredictionRequest> {
    if let Some(path) = request_file {
        return load_request(path);
    }

    let readings = readings
        .iter()
        .map(|r| parse_reading(r))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PredictionRequest {
        timestamp: Utc::now(),
        plant_growth_stage: stage.context("--stage is required without --request")?,
        time_since_last_watering_hours: hours_since
            .context("--hours-since is required without --request")?,
        readings,
    })
}

pub struct PredictArgs {
    pub model_dir: PathBuf,
    pub pattern: Option<String>,
    pub request: PredictionRequest,
    pub explain: bool,
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Rule")]
    rule: String,
    #[tabled(rename = "Factor")]
    factor: String,
}

pub fn run_predict(args: PredictArgs, format: OutputFormat) -> Result<()> {
    args.request.validate()?;

    let config = PredictorConfig {
        model_dir: args.model_dir,
        model_pattern: args
            .pattern
            .unwrap_or_else(|| DEFAULT_MODEL_PATTERN.to_string()),
        ..PredictorConfig::default()
    };
    let orchestrator = PredictionOrchestrator::from_config(&config)?;
    let result = orchestrator.predict(&args.request);

    print_result(&result, format)?;

    if args.explain && format == OutputFormat::Table {
        explain_fallback(&args.request, &result);
    }
    Ok(())
}

fn explain_fallback(request: &PredictionRequest, result: &PredictionResult) {
    let Some(reason) = result.provenance.fallback_reason() else {
        return;
    };

    let estimate = FallbackPredictor::new().evaluate(
        &request.snapshot(),
        request.growth_stage(),
        request.time_since_last_watering_hours,
        reason,
    );

    println!();
    println!("{}", "Fallback breakdown".bold());
    println!(
        "Soil humidity baseline: {}",
        format_hours(estimate.baseline_hours)
    );
    if estimate.rules_applied.is_empty() {
        print_info("Baseline only: extended rules apply when no model exists at all");
        return;
    }

    print_table(
        estimate
            .rules_applied
            .iter()
            .map(|applied| RuleRow {
                rule: applied.rule.name().to_string(),
                factor: format!("×{:.2}", applied.factor),
            })
            .collect(),
    );
}
