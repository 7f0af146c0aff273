//! Prediction against a running service

use anyhow::Result;
use std::path::Path;

use crate::client::ApiClient;
use crate::commands::predict::load_request;
use crate::output::{print_result, OutputFormat};

pub async fn run_remote(client: &ApiClient, request_file: &Path, format: OutputFormat) -> Result<()> {
    let request = load_request(request_file)?;
    let result = client.predict(&request).await?;
    print_result(&result, format)
}
