//! Greenhouse Irrigation Predictor CLI
//!
//! A command-line tool for running predictions against a local model
//! directory, inspecting trained artifacts, and querying a running service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{model, predict, remote};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Greenhouse Irrigation Predictor CLI
#[derive(Parser)]
#[command(name = "irrigate")]
#[command(author, version, about = "CLI for the Greenhouse Irrigation Predictor", long_about = None)]
pub struct Cli {
    /// Output format (defaults to the config file value, then table)
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Log pipeline decisions to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict the next watering locally from a model directory
    Predict {
        /// Directory holding trained artifacts
        #[arg(long, env = "IRRIGATION_MODEL_DIR")]
        model_dir: Option<PathBuf>,

        /// Artifact file-name pattern with a single '*'
        #[arg(long)]
        pattern: Option<String>,

        /// Plant growth stage (e.g. Seedling, Vegetative Stage, Flowering)
        #[arg(long, required_unless_present = "request")]
        stage: Option<String>,

        /// Hours since the plant was last watered
        #[arg(long, required_unless_present = "request")]
        hours_since: Option<f64>,

        /// Sensor reading as Name=value, repeatable
        #[arg(long = "reading", short = 'r')]
        readings: Vec<String>,

        /// Read the whole request from a JSON file instead
        #[arg(long, conflicts_with_all = ["stage", "hours_since", "readings"])]
        request: Option<PathBuf>,

        /// Show how a fallback estimate was derived
        #[arg(long)]
        explain: bool,
    },

    /// Show the artifact that would be used right now
    Resolve {
        #[arg(long, env = "IRRIGATION_MODEL_DIR")]
        model_dir: Option<PathBuf>,

        #[arg(long)]
        pattern: Option<String>,
    },

    /// Check whether an artifact loads, and how
    Inspect {
        /// Path to the .onnx artifact
        artifact: PathBuf,

        /// Run one inference on default sensor values
        #[arg(long)]
        probe: bool,
    },

    /// Send a request to a running prediction service
    Remote {
        /// Service URL (can also be set via IRRIGATION_API_URL env var)
        #[arg(long, env = "IRRIGATION_API_URL")]
        api_url: Option<String>,

        /// JSON request file
        #[arg(long)]
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("predictor_lib=debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::Config::load()?;
    let format = config.format(cli.format);

    match cli.command {
        Commands::Predict {
            model_dir,
            pattern,
            stage,
            hours_since,
            readings,
            request,
            explain,
        } => {
            let request = predict::build_request(request.as_deref(), stage, hours_since, &readings)?;
            let args = predict::PredictArgs {
                model_dir: config.model_dir(model_dir),
                pattern: config.model_pattern(pattern),
                request,
                explain,
            };
            predict::run_predict(args, format)?;
        }
        Commands::Resolve { model_dir, pattern } => {
            let pattern = config.model_pattern(pattern);
            model::resolve(&config.model_dir(model_dir), pattern.as_deref(), format)?;
        }
        Commands::Inspect { artifact, probe } => {
            model::inspect(&artifact, probe, format)?;
        }
        Commands::Remote { api_url, request } => {
            let client = client::ApiClient::new(&config.api_url(api_url))?;
            remote::run_remote(&client, &request, format).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_predict_arguments() {
        let cli = Cli::try_parse_from([
            "irrigate",
            "predict",
            "--model-dir",
            "/srv/models",
            "--stage",
            "Seedling",
            "--hours-since",
            "12",
            "-r",
            "Soil Humidity=35",
            "--reading",
            "Temperature=22.5",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(output::OutputFormat::Json));
        match cli.command {
            Commands::Predict {
                model_dir,
                stage,
                hours_since,
                readings,
                request,
                ..
            } => {
                assert_eq!(model_dir, Some(PathBuf::from("/srv/models")));
                assert_eq!(stage.as_deref(), Some("Seedling"));
                assert_eq!(hours_since, Some(12.0));
                assert_eq!(readings.len(), 2);
                assert!(request.is_none());
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_predict_requires_stage_or_request() {
        assert!(Cli::try_parse_from(["irrigate", "predict", "--hours-since", "3"]).is_err());
        assert!(Cli::try_parse_from(["irrigate", "predict", "--request", "req.json"]).is_ok());
        assert!(Cli::try_parse_from([
            "irrigate",
            "predict",
            "--request",
            "req.json",
            "--stage",
            "Seedling"
        ])
        .is_err());
    }
}
