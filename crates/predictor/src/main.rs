//! Irrigation predictor - watering-interval prediction service
//!
//! Serves predictions over HTTP and, when a backend is configured, runs
//! scheduled batch predictions for the latest sensor data.

use anyhow::{Context, Result};
use irrigation_predictor::{
    api,
    backend::{HttpBatchSource, HttpPredictionSink},
    config::ServiceConfig,
};
use predictor_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    predictor::BatchScheduler,
    LoggingSink, PredictionOrchestrator, PredictionSink,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServiceConfig::load()?;
    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(
        SERVICE_VERSION,
        &config.predictor.model_dir.display().to_string(),
    );

    let orchestrator = Arc::new(
        PredictionOrchestrator::from_config(&config.predictor)
            .context("Invalid predictor configuration")?
            .with_logger(logger.clone()),
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::API).await;
    health_registry.register(components::MODEL).await;

    let sink: Arc<dyn PredictionSink> = match &config.backend_prediction_log_url {
        Some(url) => {
            info!(url = %url, "Recording predictions to backend");
            Arc::new(HttpPredictionSink::new(url.clone())?)
        }
        None => Arc::new(LoggingSink::new(logger.clone())),
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler_handle = match &config.backend_latest_data_url {
        Some(url) => {
            health_registry.register(components::SCHEDULER).await;
            let scheduler = Arc::new(
                BatchScheduler::new(
                    Arc::clone(&orchestrator),
                    Arc::new(HttpBatchSource::new(url.clone())?),
                    Arc::clone(&sink),
                    config.batch_interval(),
                )
                .with_logger(logger.clone())
                .with_health(health_registry.clone()),
            );
            Some(tokio::spawn(scheduler.run(shutdown_tx.subscribe())))
        }
        None => {
            info!("No backend batch endpoint configured, scheduled predictions disabled");
            None
        }
    };

    let app_state = Arc::new(api::AppState::new(
        orchestrator,
        sink,
        health_registry.clone(),
        logger.clone(),
    ));

    health_registry.set_ready(true).await;

    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Batch scheduler task failed");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %format!("{:#}", e), "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
