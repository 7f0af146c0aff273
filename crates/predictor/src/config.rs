//! Service configuration

use anyhow::{Context, Result};
use predictor_lib::PredictorConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Optional configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "irrigation-predictor";

/// Environment prefix, e.g. `IRRIGATION_API_PORT` or `IRRIGATION_PREDICTOR__MODEL_DIR`
pub const ENV_PREFIX: &str = "IRRIGATION";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name attached to every structured log event
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Port of the predict/health/metrics server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub predictor: PredictorConfig,

    /// Batch prediction interval in seconds
    #[serde(default = "default_batch_interval")]
    pub batch_interval_secs: u64,

    /// Endpoint serving the latest sensor batch; batch predictions are
    /// disabled when unset
    #[serde(default)]
    pub backend_latest_data_url: Option<String>,

    /// Endpoint receiving served predictions
    #[serde(default)]
    pub backend_prediction_log_url: Option<String>,
}

fn default_service_name() -> String {
    "irrigation-predictor".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_batch_interval() -> u64 {
    300
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            predictor: PredictorConfig::default(),
            batch_interval_secs: default_batch_interval(),
            backend_latest_data_url: None,
            backend_prediction_log_url: None,
        }
    }
}

impl ServiceConfig {
    /// Load from the optional config file, overridden by environment
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(file: &Path) -> Result<Self> {
        let file = file.to_string_lossy();
        let config = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        config
            .try_deserialize()
            .context("Invalid service configuration")
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs.max(1))
    }
}
