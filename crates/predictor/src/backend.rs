//! HTTP collaborators backed by the greenhouse backend
//!
//! The backend serves the latest sensor batch for scheduled predictions and
//! stores every prediction the service hands out.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use predictor_lib::predictor::BatchSource;
use predictor_lib::{PredictionLogRecord, PredictionRequest, PredictionSink};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

async fn ensure_success(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("backend error ({}): {}", status, body);
    }
    Ok(response)
}

/// Fetches the latest sensor batch with a GET on a fixed URL
pub struct HttpBatchSource {
    client: Client,
    url: String,
}

impl HttpBatchSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl BatchSource for HttpBatchSource {
    async fn fetch_batch(&self) -> Result<Vec<PredictionRequest>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch sensor batch from {}", self.url))?;

        let batch: Vec<PredictionRequest> = ensure_success(response)
            .await?
            .json()
            .await
            .context("Failed to parse sensor batch")?;

        debug!(entries = batch.len(), "Fetched sensor batch");
        Ok(batch)
    }
}

/// Posts each served prediction as JSON to the prediction-log endpoint
pub struct HttpPredictionSink {
    client: Client,
    url: String,
}

impl HttpPredictionSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PredictionSink for HttpPredictionSink {
    async fn record(&self, record: &PredictionLogRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .with_context(|| format!("Failed to post prediction to {}", self.url))?;

        ensure_success(response).await?;
        Ok(())
    }
}
