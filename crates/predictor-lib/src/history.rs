//! Prediction history collaborators
//!
//! Every served prediction can be forwarded to a sink together with the
//! request that produced it. The backend keeps this log to evaluate models
//! against what growers actually did.

use crate::models::{PredictionRequest, PredictionResult};
use crate::observability::StructuredLogger;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request context plus the prediction it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogRecord {
    #[serde(flatten)]
    pub request: PredictionRequest,
    #[serde(flatten)]
    pub result: PredictionResult,
}

impl PredictionLogRecord {
    pub fn new(request: PredictionRequest, result: PredictionResult) -> Self {
        Self { request, result }
    }
}

/// Destination for served predictions
#[async_trait]
pub trait PredictionSink: Send + Sync {
    async fn record(&self, record: &PredictionLogRecord) -> Result<()>;
}

/// Sink that only emits structured log events
#[derive(Debug, Clone)]
pub struct LoggingSink {
    logger: StructuredLogger,
}

impl LoggingSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl PredictionSink for LoggingSink {
    async fn record(&self, record: &PredictionLogRecord) -> Result<()> {
        self.logger.log_prediction_recorded(&record.result);
        Ok(())
    }
}
