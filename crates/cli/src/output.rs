//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use predictor_lib::{PredictionResult, Provenance};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_hours(hours: f64) -> String {
    if hours >= 24.0 {
        format!("{:.1}h ({:.1}d)", hours, hours / 24.0)
    } else {
        format!("{:.1}h", hours)
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Model versions in green, fallbacks in yellow
pub fn color_provenance(provenance: &Provenance) -> String {
    match provenance {
        Provenance::Model { .. } => provenance.to_string().green().to_string(),
        Provenance::Fallback(_) => provenance.to_string().yellow().to_string(),
    }
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Next Watering In")]
    hours: String,
    #[tabled(rename = "Prediction Time")]
    prediction_time: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Provenance")]
    provenance: String,
}

/// Print a prediction in the requested format
pub fn print_result(result: &PredictionResult, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Table => {
            let source = if result.is_fallback() { "fallback" } else { "model" };
            print_table(vec![ResultRow {
                hours: format_hours(result.hours_until_next_watering),
                prediction_time: format_timestamp(&result.prediction_time),
                source: source.to_string(),
                provenance: color_provenance(&result.provenance),
            }]);
            Ok(())
        }
    }
}
