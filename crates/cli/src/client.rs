//! API client for a running prediction service

use anyhow::{Context, Result};
use predictor_lib::{PredictionRequest, PredictionResult};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

const PREDICT_PATH: &str = "api/ml/predict";

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        self.post(PREDICT_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use predictor_lib::Provenance;

    fn request() -> PredictionRequest {
        serde_json::from_str(
            r#"{"timestamp": "2024-06-10T12:00:00Z", "plantGrowthStage": "Flowering",
                "timeSinceLastWateringInHours": 3}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_predict_parses_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ml/predict")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"predictionTime": "2024-06-10T12:00:00Z",
                    "hoursUntilNextWatering": 18.5,
                    "provenance": "reg_model_2024-06-09_22-00-00"}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result = client.predict(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.hours_until_next_watering, 18.5);
        assert_eq!(
            result.provenance,
            Provenance::Model {
                version: "reg_model_2024-06-09_22-00-00".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_predict_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/ml/predict")
            .with_status(422)
            .with_body(r#"{"error": "bad request"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.predict(&request()).await.unwrap_err();
        assert!(err.to_string().contains("422"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
