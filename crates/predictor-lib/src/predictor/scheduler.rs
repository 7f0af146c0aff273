//! Periodic batch predictions
//!
//! Pulls the latest sensor batch from a source on a fixed interval, answers
//! every entry through the orchestrator and forwards each result to the
//! prediction sink. A failing entry never aborts the rest of the batch.

use super::orchestrator::PredictionOrchestrator;
use crate::health::{components, HealthRegistry};
use crate::history::{PredictionLogRecord, PredictionSink};
use crate::models::PredictionRequest;
use crate::observability::{PredictorMetrics, StructuredLogger};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default batch interval (5 minutes)
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Provider of the requests to answer on each tick
#[async_trait]
pub trait BatchSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<Vec<PredictionRequest>>;
}

/// Outcome of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub model_backed: usize,
    pub fallback: usize,
    pub sink_errors: usize,
}

/// Statistics about the batch scheduler
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub batches_run: u64,
    pub fetch_failures: u64,
    pub total_predictions: u64,
    pub fallback_predictions: u64,
    pub last_batch: Option<BatchSummary>,
}

pub struct BatchScheduler {
    orchestrator: Arc<PredictionOrchestrator>,
    source: Arc<dyn BatchSource>,
    sink: Arc<dyn PredictionSink>,
    batch_interval: Duration,
    stats: RwLock<SchedulerStats>,
    metrics: PredictorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl BatchScheduler {
    pub fn new(
        orchestrator: Arc<PredictionOrchestrator>,
        source: Arc<dyn BatchSource>,
        sink: Arc<dyn PredictionSink>,
        batch_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            source,
            sink,
            batch_interval,
            stats: RwLock::new(SchedulerStats::default()),
            metrics: PredictorMetrics::new(),
            logger: StructuredLogger::new(env!("CARGO_PKG_NAME")),
            health: None,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report fetch outcomes on the `scheduler` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run the batch loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.batch_interval.as_secs(),
            "Starting batch prediction scheduler"
        );

        let mut ticker = interval(self.batch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_batch().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down batch prediction scheduler");
                    break;
                }
            }
        }
    }

    /// Fetch and answer one batch
    pub async fn run_batch(&self) -> BatchSummary {
        let start = Instant::now();

        let requests = match self.source.fetch_batch().await {
            Ok(requests) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::SCHEDULER).await;
                }
                requests
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(error = %message, "Failed to fetch sensor batch");
                self.stats.write().await.fetch_failures += 1;
                if let Some(health) = &self.health {
                    health
                        .set_degraded(
                            components::SCHEDULER,
                            format!("failed to fetch sensor batch: {}", message),
                        )
                        .await;
                }
                Vec::new()
            }
        };

        let mut summary = BatchSummary::default();
        for request in requests {
            let orchestrator = Arc::clone(&self.orchestrator);
            let job = request.clone();
            let result = match tokio::task::spawn_blocking(move || orchestrator.predict(&job)).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Prediction task failed");
                    continue;
                }
            };

            summary.total += 1;
            if result.is_fallback() {
                summary.fallback += 1;
            } else {
                summary.model_backed += 1;
            }

            let record = PredictionLogRecord::new(request, result);
            if let Err(e) = self.sink.record(&record).await {
                summary.sink_errors += 1;
                self.metrics.inc_sink_errors();
                warn!(error = %format!("{:#}", e), "Failed to record prediction");
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.batches_run += 1;
            stats.total_predictions += summary.total as u64;
            stats.fallback_predictions += summary.fallback as u64;
            stats.last_batch = Some(summary);
        }

        self.metrics.inc_batch_runs();
        self.logger.log_batch_completed(
            summary.total,
            summary.model_backed,
            summary.fallback,
            summary.sink_errors,
        );
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Batch run finished");

        summary
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }
}
