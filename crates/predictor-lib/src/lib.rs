//! Library for greenhouse irrigation prediction
//!
//! This crate provides the core functionality for:
//! - Sensor data model and request/response types
//! - Model resolution, loading and ONNX inference
//! - Rule-based fallback and the graduated-fallback orchestrator
//! - Batch scheduling and prediction history
//! - Health checks and observability

pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod predictor;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{LoggingSink, PredictionLogRecord, PredictionSink};
pub use models::*;
pub use observability::{PredictorMetrics, StructuredLogger};
pub use predictor::{PredictionOrchestrator, PredictorConfig};
